//! Mock capture backend for unit and integration testing.
//!
//! Allows tests to inject synthetic key events and attach/detach synthetic
//! devices without OS hooks or hardware. Cloning a mock shares the
//! underlying state, so a test can keep a handle for injection after giving
//! the other clone to a [`crate::BarcodeScanner`].

use std::sync::{Arc, Mutex};

use crossbeam_channel::{unbounded, Sender};
use scanhook_core::{Device, DeviceEvent, KeyEvent};

use crate::registry::DeviceRegistry;

use super::{CaptureError, CaptureStreams, KeyboardCapture};

struct Senders {
    keys: Sender<KeyEvent>,
    devices: Sender<DeviceEvent>,
}

#[derive(Default)]
struct MockInner {
    registry: DeviceRegistry,
    senders: Mutex<Option<Senders>>,
}

/// A mock implementation of [`KeyboardCapture`] driven by the test.
#[derive(Clone, Default)]
pub struct MockKeyboardCapture {
    inner: Arc<MockInner>,
}

impl MockKeyboardCapture {
    pub fn new() -> Self {
        Self::default()
    }

    /// Injects a synthetic key event, as if captured from hardware.
    ///
    /// Panics if the backend has not been started.
    pub fn inject_key(&self, event: KeyEvent) {
        let guard = self.inner.senders.lock().expect("lock poisoned");
        match guard.as_ref() {
            Some(senders) => senders
                .keys
                .send(event)
                .expect("receiver has been dropped; is the scanner running?"),
            None => panic!("MockKeyboardCapture::inject_key called before start()"),
        }
    }

    /// Registers a synthetic device and announces its arrival.
    pub fn attach_device(&self, device: Device) {
        self.inner.registry.insert(device.clone());
        self.send_device_event(DeviceEvent {
            device,
            attached: true,
        });
    }

    /// Removes a synthetic device and announces its departure.
    pub fn detach_device(&self, native_handle: u64) {
        if let Some(device) = self.inner.registry.remove(native_handle) {
            self.send_device_event(DeviceEvent {
                device,
                attached: false,
            });
        }
    }

    fn send_device_event(&self, event: DeviceEvent) {
        let guard = self.inner.senders.lock().expect("lock poisoned");
        if let Some(senders) = guard.as_ref() {
            let _ = senders.devices.send(event);
        }
    }
}

impl KeyboardCapture for MockKeyboardCapture {
    fn start(&mut self) -> Result<CaptureStreams, CaptureError> {
        let mut guard = self.inner.senders.lock().expect("lock poisoned");
        if guard.is_some() {
            return Err(CaptureError::AlreadyRunning);
        }
        let (keys_tx, keys_rx) = unbounded();
        let (devices_tx, devices_rx) = unbounded();
        *guard = Some(Senders {
            keys: keys_tx,
            devices: devices_tx,
        });
        Ok(CaptureStreams {
            keys: keys_rx,
            devices: devices_rx,
        })
    }

    fn stop(&mut self) {
        // Dropping the senders disconnects the streams.
        *self.inner.senders.lock().expect("lock poisoned") = None;
    }

    fn list_devices(&self) -> Vec<Device> {
        self.inner.registry.snapshot()
    }
}
