//! # scanhook-core
//!
//! Shared library for scanhook containing the barcode framing state machine,
//! the US-layout scancode translation tables, the multi-device router, and
//! the platform-neutral domain types.
//!
//! This crate is used by the capture backends and the demo binary.
//! It has zero dependencies on OS APIs.
//!
//! # Architecture overview
//!
//! Barcode scanners in HID keyboard-emulation mode "type" their payload as a
//! fast burst of keystrokes. Reading one without a focused window means
//! capturing the raw keystroke stream at the OS level (the job of
//! `scanhook-capture`) and then reassembling it into discrete barcode
//! strings. This crate is the reassembly half:
//!
//! - **`domain`** – Value types shared across the workspace: `Device`,
//!   `KeyEvent`, `DeviceEvent`, `BarcodeRead`, and the `FramingConfig`
//!   describing how a scanner delimits its payload.
//!
//! - **`scancode`** – A fixed US PC/AT scancode-to-character table (normal
//!   and shifted). Pure lookup, no state.
//!
//! - **`framer`** – The state machine that consumes per-key down/up events
//!   and produces completed barcode strings, including the inter-key
//!   timeout reset and the trailer-timeout auto-segmentation timer.
//!
//! - **`router`** – Disambiguates interleaved keystrokes from multiple
//!   concurrently attached scanners before they reach the framer.

pub mod domain;
pub mod framer;
pub mod router;
pub mod scancode;

// Re-export the most-used types at the crate root so callers can write
// `scanhook_core::BarcodeFramer` instead of the full module path.
pub use domain::device::{BarcodeRead, Device, DeviceEvent, DeviceId, KeyEvent, KeyState};
pub use domain::framing::FramingConfig;
pub use framer::{BarcodeFramer, INTER_KEY_TIMEOUT, TRAILER_TIMEOUT};
pub use router::DeviceRouter;
