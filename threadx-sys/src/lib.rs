//! Raw bindings to Azure RTOS ThreadX 6.4.1 for the pios-rtos ThreadX
//! backend.
//!
//! ```quote
//!     /**************************************************************************/
//!     /* Copyright (c) 2024 Microsoft Corporation                               */
//!     /*                                                                        */
//!     /* This program and the accompanying materials are made available under   */
//!     /* the terms of the MIT License which is available at                     */
//!     /*  https://opensource.org/licenses/MIT.                                  */
//!     /*                                                                        */
//!     /* SPDX-License-Identifier: MIT                                           */
//!     /**************************************************************************/
//! ```
//!
//! The bindings are generated from the ThreadX headers of the target port.
//! `src/bindings.rs` is not checked in: generate it once with the `bindgen`
//! feature (see `build.rs`) against the port you link with.

#![no_std]
#![allow(non_snake_case)]
#![allow(non_camel_case_types)]
#![allow(non_upper_case_globals)]
#![allow(clippy::missing_safety_doc)]

include!(concat!(env!("OUT_DIR"), "/bindings.rs"));

// Object-like macros bindgen does not evaluate.
// TX_INT_DISABLE and TX_INT_ENABLE come from the port header and are in
// bindings.rs.

pub const TX_NO_WAIT: ULONG = 0;
pub const TX_WAIT_FOREVER: ULONG = 0xFFFF_FFFF;
pub const TX_1_ULONG: UINT = 1;
pub const TX_NO_TIME_SLICE: ULONG = 0;
pub const TX_AUTO_START: UINT = 1;
pub const TX_INHERIT: UINT = 1;

/// Service completed successfully.
pub const TX_SUCCESS: UINT = 0x00;

// Thread states (`tx_thread_state`) a finished thread can be in.
pub const TX_COMPLETED: UINT = 1;
pub const TX_TERMINATED: UINT = 2;
