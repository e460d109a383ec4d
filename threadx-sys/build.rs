//! Build script for threadx-sys.
//!
//! Without the `bindgen` feature the checked-out `src/bindings.rs` is used.
//! With it, bindings are generated from `wrapper.h` against the ThreadX tree
//! at `THREADX_DIR` (default `../threadx`) and the port named by
//! `THREADX_PORT` (default `cortex_r5/gnu`); this needs libclang.
//!
//! To keep a generated file:
//!   cp target/<target>/<profile>/build/threadx-sys-*/out/bindings.rs threadx-sys/src/bindings.rs

use std::env;
use std::error::Error;
use std::path::PathBuf;

fn main() -> Result<(), Box<dyn Error>> {
    let crate_dir = PathBuf::from(env::var("CARGO_MANIFEST_DIR")?);
    let out_path = PathBuf::from(env::var("OUT_DIR")?).join("bindings.rs");

    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-changed=wrapper.h");
    println!("cargo:rerun-if-env-changed=THREADX_DIR");
    println!("cargo:rerun-if-env-changed=THREADX_PORT");

    #[cfg(feature = "bindgen")]
    generate_bindings(&crate_dir, &out_path)?;

    #[cfg(not(feature = "bindgen"))]
    {
        let pregenerated = crate_dir.join("src").join("bindings.rs");
        println!("cargo:rerun-if-changed={}", pregenerated.display());
        if !pregenerated.exists() {
            return Err(format!(
                "{} missing; enable the `bindgen` feature to generate it",
                pregenerated.display()
            )
            .into());
        }
        std::fs::copy(&pregenerated, &out_path)?;
    }

    Ok(())
}

#[cfg(feature = "bindgen")]
fn generate_bindings(crate_dir: &std::path::Path, out_path: &std::path::Path) -> Result<(), Box<dyn Error>> {
    let tx_dir = env::var_os("THREADX_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|| crate_dir.join("../threadx"));
    let port = env::var("THREADX_PORT").unwrap_or_else(|_| "cortex_r5/gnu".to_string());
    let common_inc = tx_dir.join("common/inc");
    let port_inc = tx_dir.join("ports").join(&port).join("inc");
    println!("cargo:rerun-if-changed={}", common_inc.display());
    println!("cargo:rerun-if-changed={}", port_inc.display());

    let bindings = bindgen::Builder::default()
        .header(crate_dir.join("wrapper.h").display().to_string())
        .clang_arg(format!("-I{}", common_inc.display()))
        .clang_arg(format!("-I{}", port_inc.display()))
        .clang_arg(format!("--target={}", env::var("TARGET")?))
        .use_core()
        .allowlist_function("_tx_.*")
        .allowlist_type("TX_.*")
        .allowlist_var("TX_.*")
        .formatter(bindgen::Formatter::Rustfmt)
        .generate()?;

    bindings.write_to_file(out_path)?;
    println!("cargo:warning=bindings generated at {}", out_path.display());
    Ok(())
}
