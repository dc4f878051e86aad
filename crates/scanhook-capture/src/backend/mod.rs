//! Keyboard capture backends.
//!
//! A backend owns exactly one OS-facing thread that blocks on a platform
//! primitive (a Win32 message loop or `poll(2)` on the libinput fd) and
//! forwards what it captures over channels. The [`KeyboardCapture`] trait is
//! the seam between the OS-specific code and the platform-neutral scanner
//! service; tests substitute [`mock::MockKeyboardCapture`].

use crossbeam_channel::Receiver;
use scanhook_core::{Device, DeviceEvent, KeyEvent};

pub mod mock;

#[cfg(target_os = "linux")]
pub mod linux_input;

#[cfg(target_os = "windows")]
pub mod windows_hook;

#[cfg(target_os = "windows")]
pub mod windows_raw;

/// Event channels handed out by a started backend.
///
/// Both senders live on the backend's capture thread; the channels
/// disconnect when the backend stops, which is how the consumer learns the
/// streams have ended.
pub struct CaptureStreams {
    /// Per-keystroke events, in capture order.
    pub keys: Receiver<KeyEvent>,
    /// Device attach/detach notifications.
    pub devices: Receiver<DeviceEvent>,
}

/// Error type for capture backend operations.
#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("backend failed to initialize: {0}")]
    BackendInit(String),
    #[error("backend already running; only one capture session per instance")]
    AlreadyRunning,
    #[error("capture backend `{0}` is not available on this platform")]
    UnsupportedPlatform(&'static str),
}

/// Trait abstracting OS keyboard capture.
///
/// `start` and `stop` are idempotent at the [`crate::BarcodeScanner`] level;
/// backends themselves reject a second `start` while running.
pub trait KeyboardCapture: Send {
    /// Starts the capture thread and returns the event streams.
    fn start(&mut self) -> Result<CaptureStreams, CaptureError>;
    /// Stops the capture thread and releases all OS resources. No-op when
    /// not running.
    fn stop(&mut self);
    /// Snapshot of the currently attached keyboard-class devices. Empty for
    /// backends without device identity.
    fn list_devices(&self) -> Vec<Device>;
}

/// Which capture strategy to instantiate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackendKind {
    /// Platform default: raw input on Windows, libinput on Linux.
    #[default]
    Auto,
    /// Windows raw input (message-only window, per-device events).
    RawInput,
    /// Windows low-level keyboard hook (no device identity).
    GlobalHook,
}

/// Instantiates the capture backend for this platform.
#[cfg(target_os = "windows")]
pub fn platform_backend(kind: BackendKind) -> Result<Box<dyn KeyboardCapture>, CaptureError> {
    match kind {
        BackendKind::Auto | BackendKind::RawInput => {
            Ok(Box::new(windows_raw::RawInputCapture::new()))
        }
        BackendKind::GlobalHook => Ok(Box::new(windows_hook::GlobalHookCapture::new())),
    }
}

/// Instantiates the capture backend for this platform.
#[cfg(target_os = "linux")]
pub fn platform_backend(kind: BackendKind) -> Result<Box<dyn KeyboardCapture>, CaptureError> {
    match kind {
        BackendKind::Auto => Ok(Box::new(linux_input::LibinputCapture::new())),
        BackendKind::RawInput => Err(CaptureError::UnsupportedPlatform("raw-input")),
        BackendKind::GlobalHook => Err(CaptureError::UnsupportedPlatform("global-hook")),
    }
}

/// Instantiates the capture backend for this platform.
#[cfg(not(any(target_os = "windows", target_os = "linux")))]
pub fn platform_backend(_kind: BackendKind) -> Result<Box<dyn KeyboardCapture>, CaptureError> {
    Err(CaptureError::UnsupportedPlatform("keyboard capture"))
}
