//! # scanhook-capture
//!
//! OS-facing half of scanhook: keyboard capture backends for Windows and
//! Linux, the attached-device registry, and the [`BarcodeScanner`] service
//! that wires a backend into the framing pipeline from `scanhook-core`.
//!
//! # Capture strategies
//!
//! Keyboard-emulating barcode scanners type into whatever has focus. To read
//! them without a focused window the capture layer taps the keystroke stream
//! at the OS level:
//!
//! - **Windows raw input** (preferred): a message-only window registered for
//!   HID keyboard raw input receives every keystroke tagged with the device
//!   handle that produced it, plus plug/unplug notifications.
//! - **Windows low-level hook**: a `WH_KEYBOARD_LL` hook sees the same
//!   keystrokes but the OS erases device identity on this path; events carry
//!   no device ID and the router cannot disambiguate scanners.
//! - **Linux libinput**: a udev-backed libinput context on `seat0`, polled on
//!   a dedicated thread, delivers per-device key events and hotplug.
//!
//! All backends implement [`backend::KeyboardCapture`] and deliver events
//! over channels to the scanner's pump thread; none of them require or steal
//! input focus.

pub mod backend;
pub mod registry;
pub mod service;

pub use backend::{platform_backend, BackendKind, CaptureError, CaptureStreams, KeyboardCapture};
pub use registry::DeviceRegistry;
pub use service::BarcodeScanner;
