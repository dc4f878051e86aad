//! Attached-device registry and stable-ID derivation.
//!
//! Backends report devices by a native handle that is only valid while the
//! device stays plugged in (a `HANDLE` address on Windows, a libinput device
//! pointer on Linux). The registry maps those volatile handles to [`Device`]
//! records carrying a *stable* identifier derived from hardware properties,
//! so the same physical scanner keeps the same ID across replugs on the same
//! port and consumers can persist their device filter.
//!
//! The ID derivation helpers are pure functions so they unit-test on any
//! platform.

use std::collections::HashMap;
use std::sync::Mutex;

use scanhook_core::{Device, DeviceId};
use tracing::debug;

/// Thread-safe snapshot of the currently attached keyboard-class devices,
/// keyed by native handle.
#[derive(Default)]
pub struct DeviceRegistry {
    devices: Mutex<HashMap<u64, Device>>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an arrival. Returns `false` when the handle was already
    /// registered, which happens when the OS re-announces a known device.
    pub fn insert(&self, device: Device) -> bool {
        let mut devices = self.lock();
        match devices.insert(device.native_handle, device) {
            None => true,
            Some(previous) => {
                debug!(stable_id = %previous.stable_id, "re-announced device already registered");
                false
            }
        }
    }

    /// Records a removal, returning the forgotten device if it was known.
    pub fn remove(&self, native_handle: u64) -> Option<Device> {
        self.lock().remove(&native_handle)
    }

    /// Stable ID for a native handle, if the device is currently attached.
    pub fn stable_id(&self, native_handle: u64) -> Option<DeviceId> {
        self.lock().get(&native_handle).map(|d| d.stable_id.clone())
    }

    /// Point-in-time copy of every attached device.
    pub fn snapshot(&self) -> Vec<Device> {
        self.lock().values().cloned().collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<u64, Device>> {
        self.devices.lock().expect("device registry lock poisoned")
    }
}

/// Derives a stable ID from a Windows device interface path.
///
/// Interface paths look like
/// `\\?\HID#VID_05E0&PID_1200#7&2e9a&0&0000#{884b...}`: the first three
/// `#`-separated segments (device class, hardware ID, port instance) are
/// stable across replugs on the same port while the trailing GUID segment is
/// not. They are joined with `_` to form the ID. An unparseable path falls
/// back to the formatted native handle.
pub fn windows_stable_id(interface_path: &str, native_handle: u64) -> DeviceId {
    let trimmed = interface_path.strip_prefix(r"\\?\").unwrap_or(interface_path);
    let segments: Vec<&str> = trimmed.split('#').collect();
    if segments.len() >= 3 {
        segments[..3].join("_")
    } else {
        format!("0x{native_handle:X}")
    }
}

/// Derives a stable ID from a Linux devnode plus USB vendor/product IDs.
pub fn linux_stable_id(devnode: &str, vendor_id: u32, product_id: u32) -> DeviceId {
    format!("{devnode}/VID:{vendor_id:X}&PID_{product_id:X}")
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn device(handle: u64, stable_id: &str) -> Device {
        Device {
            native_handle: handle,
            stable_id: stable_id.to_string(),
            name: format!("device {stable_id}"),
            path: format!("/dev/test/{handle}"),
        }
    }

    #[test]
    fn test_insert_and_snapshot() {
        // Arrange
        let registry = DeviceRegistry::new();

        // Act
        assert!(registry.insert(device(1, "A")));
        assert!(registry.insert(device(2, "B")));

        // Assert
        let mut ids: Vec<_> = registry.snapshot().into_iter().map(|d| d.stable_id).collect();
        ids.sort();
        assert_eq!(ids, vec!["A", "B"]);
    }

    #[test]
    fn test_reinsert_same_handle_reports_known() {
        let registry = DeviceRegistry::new();
        assert!(registry.insert(device(1, "A")));

        // Re-announcement of the same handle is not a new arrival.
        assert!(!registry.insert(device(1, "A")));
        assert_eq!(registry.snapshot().len(), 1);
    }

    #[test]
    fn test_remove_forgets_the_device() {
        let registry = DeviceRegistry::new();
        registry.insert(device(1, "A"));

        let removed = registry.remove(1).expect("device was registered");
        assert_eq!(removed.stable_id, "A");
        assert!(registry.remove(1).is_none());
        assert!(registry.snapshot().is_empty());
    }

    #[test]
    fn test_stable_id_lookup() {
        let registry = DeviceRegistry::new();
        registry.insert(device(7, "SCANNER"));

        assert_eq!(registry.stable_id(7).as_deref(), Some("SCANNER"));
        assert_eq!(registry.stable_id(8), None);
    }

    #[test]
    fn test_windows_stable_id_joins_first_three_segments() {
        let path = r"\\?\HID#VID_05E0&PID_1200#7&2e9a&0&0000#{884b96c3-56ef-11d1-bc8c-00a0c91405dd}";
        assert_eq!(
            windows_stable_id(path, 0xDEAD),
            "HID_VID_05E0&PID_1200_7&2e9a&0&0000"
        );
    }

    #[test]
    fn test_windows_stable_id_is_port_sensitive() {
        // Same hardware on a different port yields a different ID.
        let port_a = windows_stable_id(r"\\?\HID#VID_05E0&PID_1200#7&aaaa#{g}", 1);
        let port_b = windows_stable_id(r"\\?\HID#VID_05E0&PID_1200#7&bbbb#{g}", 1);
        assert_ne!(port_a, port_b);
    }

    #[test]
    fn test_windows_stable_id_falls_back_to_handle() {
        assert_eq!(windows_stable_id("garbage-path", 0xFF00), "0xFF00");
        assert_eq!(windows_stable_id("", 16), "0x10");
    }

    #[test]
    fn test_linux_stable_id_format() {
        assert_eq!(
            linux_stable_id("/dev/input/event5", 0x05E0, 0x1200),
            "/dev/input/event5/VID:5E0&PID_1200"
        );
    }
}
