//! Device identity and per-keystroke event types.
//!
//! A `Device` is created when the OS reports the arrival of a
//! keyboard-capable input device and is immutable from then on; removal
//! simply drops it from the registry. The `stable_id` is a surrogate string
//! derived from hardware identifiers (interface path segments on Windows,
//! devnode + VID/PID on Linux) so the same physical scanner keeps the same
//! identity across replugs on the same port.

use std::time::Instant;

/// Stable surrogate identifier for an attached input device.
///
/// Deterministic across replugs of the same physical device on the same
/// port/bus topology. Uniqueness is not guaranteed across different device
/// classes exposing the same VID/PID on different interfaces.
pub type DeviceId = String;

/// An attached keyboard-class input device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Device {
    /// Opaque per-platform native handle (`HANDLE` address on Windows,
    /// libinput device pointer address on Linux). Registry key only; never
    /// dereferenced outside the owning backend.
    pub native_handle: u64,
    /// Hardware-derived surrogate identifier.
    pub stable_id: DeviceId,
    /// Human-readable device name, when the platform reports one.
    pub name: String,
    /// Native device path (interface path on Windows, devnode on Linux).
    pub path: String,
}

/// Attach/detach notification delivered to consumers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceEvent {
    pub device: Device,
    /// `true` on arrival, `false` on removal.
    pub attached: bool,
}

/// Key transition direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyState {
    Down,
    Up,
}

/// A single keystroke captured from a backend.
///
/// Ephemeral: produced per physical press/release and consumed synchronously
/// by the router/framer on the pump thread.
#[derive(Debug, Clone)]
pub struct KeyEvent {
    /// Originating device, when the backend can attribute one. The Windows
    /// global-hook backend cannot and always reports `None`.
    pub device: Option<DeviceId>,
    /// Hardware scan code (layout-independent). On Linux this is the evdev
    /// key code, which matches the PC/AT set-1 codes for the main key block.
    pub scan_code: u32,
    /// OS-level virtual key code. On Linux this mirrors `scan_code`.
    pub virtual_key: u32,
    pub state: KeyState,
    /// Capture-time timestamp, used for the inter-key timeout.
    pub timestamp: Instant,
}

impl KeyEvent {
    /// Convenience constructor stamping the event with the current time.
    pub fn now(device: Option<DeviceId>, scan_code: u32, virtual_key: u32, state: KeyState) -> Self {
        Self {
            device,
            scan_code,
            virtual_key,
            state,
            timestamp: Instant::now(),
        }
    }
}

/// A completed barcode read, tagged with the device that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BarcodeRead {
    /// `None` when the originating backend cannot attribute a device
    /// (global-hook path).
    pub device: Option<DeviceId>,
    pub barcode: String,
}
