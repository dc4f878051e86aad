//! The barcode scanner service.
//!
//! [`BarcodeScanner`] is the consumer-facing object: it owns a capture
//! backend, a [`DeviceRouter`] wrapping a [`BarcodeFramer`], and the pump
//! thread that serializes the backend's key and device streams into them.
//! Callbacks fire synchronously on the pump thread (or, for timeout-mode
//! emissions, on the framer's timer thread); consumers that need another
//! execution context redispatch themselves.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::select;
use scanhook_core::{BarcodeFramer, BarcodeRead, Device, DeviceEvent, DeviceRouter, FramingConfig};
use tracing::{debug, info};

use crate::backend::{CaptureError, CaptureStreams, KeyboardCapture};

/// Receives barcode scanner input system-wide, without window focus.
///
/// Owned object with an explicit lifecycle: construct with a backend and
/// callbacks, then [`start`](Self::start) and [`stop`](Self::stop) at will;
/// both are idempotent. Dropping a running scanner stops it.
pub struct BarcodeScanner {
    backend: Box<dyn KeyboardCapture>,
    router: Arc<DeviceRouter>,
    on_device_change: Arc<dyn Fn(DeviceEvent) + Send + Sync>,
    pump: Option<JoinHandle<()>>,
}

impl BarcodeScanner {
    /// Wires `backend → router → framer` with the given framing rules.
    ///
    /// `on_barcode` fires once per completed read; `on_device_change` once
    /// per attach/detach. An empty `device_filter` accepts every device
    /// (Open mode).
    pub fn new(
        framing: FramingConfig,
        device_filter: impl Into<String>,
        backend: Box<dyn KeyboardCapture>,
        on_barcode: impl Fn(BarcodeRead) + Send + Sync + 'static,
        on_device_change: impl Fn(DeviceEvent) + Send + Sync + 'static,
    ) -> Self {
        let framer = BarcodeFramer::new(framing, on_barcode);
        Self {
            backend,
            router: Arc::new(DeviceRouter::new(framer, device_filter)),
            on_device_change: Arc::new(on_device_change),
            pump: None,
        }
    }

    /// Starts the backend and the pump thread. Calling `start` on a running
    /// scanner is a no-op.
    pub fn start(&mut self) -> Result<(), CaptureError> {
        if self.pump.is_some() {
            debug!("scanner already running, start ignored");
            return Ok(());
        }

        let streams = self.backend.start()?;
        let router = Arc::clone(&self.router);
        let on_device_change = Arc::clone(&self.on_device_change);
        let pump = thread::Builder::new()
            .name("scanhook-pump".to_string())
            .spawn(move || run_pump(streams, router, on_device_change))
            .map_err(|e| {
                self.backend.stop();
                CaptureError::BackendInit(e.to_string())
            })?;

        info!("barcode scanner started");
        self.pump = Some(pump);
        Ok(())
    }

    /// Stops the backend and joins the pump thread. Calling `stop` on a
    /// stopped scanner is a no-op.
    pub fn stop(&mut self) {
        if let Some(pump) = self.pump.take() {
            // Stopping the backend disconnects the streams, which ends the
            // pump loop.
            self.backend.stop();
            let _ = pump.join();
            info!("barcode scanner stopped");
        }
    }

    /// `true` while the capture pipeline is running.
    pub fn is_running(&self) -> bool {
        self.pump.is_some()
    }

    /// Restricts framing to a single device by stable ID; empty string
    /// returns to Open mode. Takes effect immediately.
    pub fn set_device_filter(&self, filter: impl Into<String>) {
        self.router.set_filter(filter);
    }

    /// Current device filter; empty string in Open mode.
    pub fn device_filter(&self) -> String {
        self.router.filter()
    }

    /// Snapshot of the currently attached keyboard-class devices.
    pub fn list_devices(&self) -> Vec<Device> {
        self.backend.list_devices()
    }
}

impl Drop for BarcodeScanner {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Pump thread body: forwards both backend streams until they disconnect.
fn run_pump(
    streams: CaptureStreams,
    router: Arc<DeviceRouter>,
    on_device_change: Arc<dyn Fn(DeviceEvent) + Send + Sync>,
) {
    let CaptureStreams { keys, devices } = streams;
    loop {
        select! {
            recv(keys) -> event => match event {
                Ok(event) => router.handle_event(&event),
                Err(_) => break,
            },
            recv(devices) -> event => match event {
                Ok(event) => on_device_change(event),
                Err(_) => break,
            },
        }
    }
    // Both senders live on the backend thread and disconnect together;
    // drain whatever is still queued on the other stream.
    for event in keys.iter() {
        router.handle_event(&event);
    }
    for event in devices.iter() {
        on_device_change(event);
    }
    debug!("pump thread exiting");
}
