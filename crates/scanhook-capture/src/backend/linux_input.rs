//! Linux libinput capture backend.
//!
//! Opens a udev-backed libinput context assigned to `seat0` and drains it
//! from a dedicated thread that blocks in `poll(2)` on the libinput fd.
//! libinput reads evdev devices directly, below the display server, so
//! keystrokes arrive regardless of window focus and every event is tagged
//! with the device that produced it. Requires read access to
//! `/dev/input/event*` (typically membership in the `input` group, or root).
//!
//! Evdev key codes for the main keyboard block match the PC/AT set-1 scan
//! codes, so the shared translation tables apply unchanged.

#![cfg(target_os = "linux")]

use std::fs::{File, OpenOptions};
use std::os::fd::{AsRawFd, OwnedFd};
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, unbounded, Sender};
use input::event::device::DeviceEvent as LibinputDeviceEvent;
use input::event::keyboard::{KeyState as LibinputKeyState, KeyboardEvent, KeyboardEventTrait};
use input::event::{Event, EventTrait};
use input::{AsRaw, DeviceCapability, Libinput, LibinputInterface};
use libc::{O_RDONLY, O_RDWR, O_WRONLY};
use scanhook_core::{Device, DeviceEvent, KeyEvent, KeyState};
use tracing::{debug, info, warn};

use crate::registry::{linux_stable_id, DeviceRegistry};

use super::{CaptureError, CaptureStreams, KeyboardCapture};

/// How often the poll loop wakes to check the shutdown flag.
const POLL_INTERVAL: Duration = Duration::from_millis(200);

struct SeatInterface;

impl LibinputInterface for SeatInterface {
    fn open_restricted(&mut self, path: &Path, flags: i32) -> Result<OwnedFd, i32> {
        OpenOptions::new()
            .custom_flags(flags)
            .read((flags & O_RDWR != 0) | (flags & O_RDONLY == O_RDONLY))
            .write((flags & O_WRONLY != 0) | (flags & O_RDWR != 0))
            .open(path)
            .map(|file| file.into())
            .map_err(|err| err.raw_os_error().unwrap_or(-1))
    }

    fn close_restricted(&mut self, fd: OwnedFd) {
        drop(File::from(fd));
    }
}

/// libinput capture backend.
pub struct LibinputCapture {
    registry: Arc<DeviceRegistry>,
    running: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl LibinputCapture {
    pub fn new() -> Self {
        Self {
            registry: Arc::new(DeviceRegistry::new()),
            running: Arc::new(AtomicBool::new(false)),
            worker: None,
        }
    }
}

impl Default for LibinputCapture {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyboardCapture for LibinputCapture {
    fn start(&mut self) -> Result<CaptureStreams, CaptureError> {
        if self.worker.is_some() {
            return Err(CaptureError::AlreadyRunning);
        }

        let (keys_tx, keys_rx) = unbounded();
        let (devices_tx, devices_rx) = unbounded();
        // The capture thread reports seat assignment success or failure
        // before entering the poll loop, so start() can surface init errors.
        let (ready_tx, ready_rx) = bounded::<Result<(), String>>(1);

        self.running.store(true, Ordering::SeqCst);
        let running = Arc::clone(&self.running);
        let registry = Arc::clone(&self.registry);
        let thread = thread::Builder::new()
            .name("scanhook-libinput".to_string())
            .spawn(move || run_capture_loop(running, registry, keys_tx, devices_tx, ready_tx))
            .map_err(|e| CaptureError::BackendInit(e.to_string()))?;

        match ready_rx.recv() {
            Ok(Ok(())) => {
                info!("libinput capture started on seat0");
                self.worker = Some(thread);
                Ok(CaptureStreams {
                    keys: keys_rx,
                    devices: devices_rx,
                })
            }
            Ok(Err(message)) => {
                let _ = thread.join();
                Err(CaptureError::BackendInit(message))
            }
            Err(_) => {
                let _ = thread.join();
                Err(CaptureError::BackendInit(
                    "libinput thread exited before initialization".to_string(),
                ))
            }
        }
    }

    fn stop(&mut self) {
        if let Some(thread) = self.worker.take() {
            self.running.store(false, Ordering::SeqCst);
            let _ = thread.join();
            info!("libinput capture stopped");
        }
    }

    fn list_devices(&self) -> Vec<Device> {
        self.registry.snapshot()
    }
}

impl Drop for LibinputCapture {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Entry point for the dedicated capture thread.
fn run_capture_loop(
    running: Arc<AtomicBool>,
    registry: Arc<DeviceRegistry>,
    keys: Sender<KeyEvent>,
    devices: Sender<DeviceEvent>,
    ready: Sender<Result<(), String>>,
) {
    let mut context = Libinput::new_with_udev(SeatInterface);
    if context.udev_assign_seat("seat0").is_err() {
        let _ = ready.send(Err(
            "failed to assign seat0; check /dev/input permissions".to_string(),
        ));
        return;
    }
    let _ = ready.send(Ok(()));

    // Initial dispatch delivers one Added event per already-attached device,
    // so no separate enumeration pass is needed.
    drain_events(&mut context, &registry, &keys, &devices);

    let mut pollfd = libc::pollfd {
        fd: context.as_raw_fd(),
        events: libc::POLLIN,
        revents: 0,
    };
    while running.load(Ordering::SeqCst) {
        // SAFETY: pollfd points to a valid, live descriptor set of one.
        let rc = unsafe { libc::poll(&mut pollfd, 1, POLL_INTERVAL.as_millis() as i32) };
        if rc < 0 {
            let err = std::io::Error::last_os_error();
            if err.kind() == std::io::ErrorKind::Interrupted {
                continue;
            }
            warn!("poll on libinput fd failed: {err}");
            break;
        }
        if rc == 0 {
            // Timeout wakeup, only here to observe the shutdown flag.
            continue;
        }
        drain_events(&mut context, &registry, &keys, &devices);
    }
}

/// Dispatches libinput and forwards everything queued.
fn drain_events(
    context: &mut Libinput,
    registry: &DeviceRegistry,
    keys: &Sender<KeyEvent>,
    devices: &Sender<DeviceEvent>,
) {
    if let Err(e) = context.dispatch() {
        warn!("libinput dispatch failed: {e}");
        return;
    }
    for event in &mut *context {
        match event {
            Event::Device(LibinputDeviceEvent::Added(added)) => {
                let Some(device) = describe_device(&added.device()) else {
                    continue;
                };
                if registry.insert(device.clone()) {
                    info!(stable_id = %device.stable_id, name = %device.name, "keyboard device attached");
                    let _ = devices.send(DeviceEvent {
                        device,
                        attached: true,
                    });
                }
            }
            Event::Device(LibinputDeviceEvent::Removed(removed)) => {
                let handle = removed.device().as_raw() as u64;
                if let Some(device) = registry.remove(handle) {
                    info!(stable_id = %device.stable_id, "keyboard device detached");
                    let _ = devices.send(DeviceEvent {
                        device,
                        attached: false,
                    });
                }
            }
            Event::Keyboard(KeyboardEvent::Key(key_event)) => {
                let state = match key_event.key_state() {
                    LibinputKeyState::Pressed => KeyState::Down,
                    LibinputKeyState::Released => KeyState::Up,
                };
                let handle = key_event.device().as_raw() as u64;
                let stable_id = registry.stable_id(handle);
                if stable_id.is_none() {
                    debug!("key event from unregistered device");
                }
                let code = key_event.key();
                let _ = keys.send(KeyEvent::now(stable_id, code, code, state));
            }
            _ => {}
        }
    }
}

/// Builds a [`Device`] record for a libinput device, or `None` when it is
/// not keyboard-capable.
fn describe_device(device: &input::Device) -> Option<Device> {
    if !device.has_capability(DeviceCapability::Keyboard) {
        return None;
    }

    // SAFETY: The udev device outlives neither the libinput device nor this
    // scope; it is only read here.
    let devnode = unsafe { device.udev_device() }
        .and_then(|udev| udev.devnode().map(|p| p.to_string_lossy().into_owned()));
    let path = devnode.unwrap_or_else(|| device.sysname().to_string());
    let stable_id = linux_stable_id(&path, device.id_vendor(), device.id_product());

    Some(Device {
        native_handle: device.as_raw() as u64,
        stable_id,
        name: device.name().to_string(),
        path,
    })
}
