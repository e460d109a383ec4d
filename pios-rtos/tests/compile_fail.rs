//! Compile-fail tests for the type-level guarantees:
//!
//! - `!Send` guards and tokens stay on the thread that made them
//! - the interrupt-context token cannot escape its handler
//!
//! Run with: `cargo xtask ui`

#![cfg(feature = "ui-tests")]

#[test]
fn compile_fail() {
    let t = trybuild::TestCases::new();
    t.compile_fail("tests/ui/*.rs");
}
