//! Windows raw-input capture backend.
//!
//! Creates a message-only window on a dedicated thread and registers it for
//! HID keyboard raw input with `RIDEV_INPUTSINK | RIDEV_DEVNOTIFY`:
//! `INPUTSINK` delivers keystrokes regardless of focus, `DEVNOTIFY` delivers
//! `WM_INPUT_DEVICE_CHANGE` for plug/unplug, including one arrival per
//! device already attached at registration time. Every `WM_INPUT` message
//! carries the handle of the device that produced it, which is what makes
//! multi-scanner disambiguation possible on this backend.
//!
//! # Safety
//!
//! This module uses `unsafe` code exclusively for Windows API FFI calls.
//! All `unsafe` blocks are annotated with `// SAFETY:` comments. The window
//! procedure never panics; a decode failure logs and falls through to
//! `DefWindowProcW`.

#![cfg(target_os = "windows")]

use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, unbounded, Sender};
use scanhook_core::{Device, DeviceEvent, KeyEvent, KeyState};
use tracing::{debug, info, warn};

use windows::core::PCWSTR;
use windows::Win32::Foundation::{HANDLE, HINSTANCE, HWND, LPARAM, LRESULT, WPARAM};
use windows::Win32::System::LibraryLoader::GetModuleHandleW;
use windows::Win32::UI::Input::{
    GetRawInputData, GetRawInputDeviceInfoW, RegisterRawInputDevices, HRAWINPUT, RAWINPUT,
    RAWINPUTDEVICE, RAWINPUTHEADER, RIDEV_DEVNOTIFY, RIDEV_INPUTSINK, RIDI_DEVICEINFO,
    RIDI_DEVICENAME, RID_DEVICE_INFO, RID_INPUT, RIM_TYPEKEYBOARD,
};
use windows::Win32::UI::WindowsAndMessaging::{
    CreateWindowExW, DefWindowProcW, DestroyWindow, DispatchMessageW, GetMessageW, PostMessageW,
    PostQuitMessage, RegisterClassW, TranslateMessage, HWND_MESSAGE, MSG, WINDOW_EX_STYLE,
    WINDOW_STYLE, WM_CLOSE, WM_DESTROY, WM_INPUT, WNDCLASSW,
};

use crate::registry::{windows_stable_id, DeviceRegistry};

use super::{CaptureError, CaptureStreams, KeyboardCapture};

const WINDOW_CLASS: &str = "scanhook-rawinput";

/// HID usage page/usage for generic desktop keyboards.
const USAGE_PAGE_GENERIC: u16 = 0x01;
const USAGE_KEYBOARD: u16 = 0x06;

/// Not exported by the `windows` crate metadata for this message set.
const WM_INPUT_DEVICE_CHANGE: u32 = 0x00FE;
const GIDC_ARRIVAL: usize = 1;
const GIDC_REMOVAL: usize = 2;

/// `RAWKEYBOARD.Flags` bit marking a key release.
const RI_KEY_BREAK: u16 = 0x01;

/// Pre-sized WM_INPUT buffer; keyboard packets are far smaller than this.
const INPUT_BUFFER_SIZE: usize = 1024;

struct CaptureContext {
    keys: Sender<KeyEvent>,
    devices: Sender<DeviceEvent>,
    registry: Arc<DeviceRegistry>,
}

/// Context shared with the window procedure, which Windows calls with no
/// user argument. Populated for the lifetime of one capture session; holding
/// it here limits the process to one raw-input session at a time.
static CONTEXT: Mutex<Option<Arc<CaptureContext>>> = Mutex::new(None);

fn context() -> Option<Arc<CaptureContext>> {
    CONTEXT.lock().expect("raw-input context lock poisoned").clone()
}

/// Raw-input capture backend.
pub struct RawInputCapture {
    registry: Arc<DeviceRegistry>,
    /// `(message window handle, loop thread)` while running.
    worker: Option<(isize, JoinHandle<()>)>,
}

impl RawInputCapture {
    pub fn new() -> Self {
        Self {
            registry: Arc::new(DeviceRegistry::new()),
            worker: None,
        }
    }
}

impl Default for RawInputCapture {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyboardCapture for RawInputCapture {
    fn start(&mut self) -> Result<CaptureStreams, CaptureError> {
        if self.worker.is_some() {
            return Err(CaptureError::AlreadyRunning);
        }

        let (keys_tx, keys_rx) = unbounded();
        let (devices_tx, devices_rx) = unbounded();
        {
            let mut ctx = CONTEXT.lock().expect("raw-input context lock poisoned");
            if ctx.is_some() {
                return Err(CaptureError::AlreadyRunning);
            }
            *ctx = Some(Arc::new(CaptureContext {
                keys: keys_tx,
                devices: devices_tx,
                registry: Arc::clone(&self.registry),
            }));
        }

        // The loop thread reports window creation success or failure before
        // entering GetMessageW, so start() can surface init errors.
        let (ready_tx, ready_rx) = bounded::<Result<isize, String>>(1);
        let thread = thread::Builder::new()
            .name("scanhook-rawinput".to_string())
            .spawn(move || run_message_loop(ready_tx))
            .map_err(|e| {
                clear_context();
                CaptureError::BackendInit(e.to_string())
            })?;

        match ready_rx.recv() {
            Ok(Ok(hwnd)) => {
                info!("raw-input capture started");
                self.worker = Some((hwnd, thread));
                Ok(CaptureStreams {
                    keys: keys_rx,
                    devices: devices_rx,
                })
            }
            Ok(Err(message)) => {
                let _ = thread.join();
                clear_context();
                Err(CaptureError::BackendInit(message))
            }
            Err(_) => {
                let _ = thread.join();
                clear_context();
                Err(CaptureError::BackendInit(
                    "raw-input thread exited before initialization".to_string(),
                ))
            }
        }
    }

    fn stop(&mut self) {
        if let Some((hwnd, thread)) = self.worker.take() {
            // SAFETY: hwnd refers to the message-only window owned by the
            // loop thread; posting is valid from any thread.
            unsafe {
                let _ = PostMessageW(Some(HWND(hwnd as _)), WM_CLOSE, WPARAM(0), LPARAM(0));
            }
            let _ = thread.join();
            info!("raw-input capture stopped");
        }
    }

    fn list_devices(&self) -> Vec<Device> {
        self.registry.snapshot()
    }
}

impl Drop for RawInputCapture {
    fn drop(&mut self) {
        self.stop();
    }
}

fn clear_context() {
    *CONTEXT.lock().expect("raw-input context lock poisoned") = None;
}

fn to_wstring(s: &str) -> Vec<u16> {
    use std::os::windows::ffi::OsStrExt;
    std::ffi::OsStr::new(s)
        .encode_wide()
        .chain(std::iter::once(0))
        .collect()
}

/// Entry point for the dedicated message loop thread.
fn run_message_loop(ready: Sender<Result<isize, String>>) {
    let hwnd = match create_capture_window() {
        Ok(hwnd) => hwnd,
        Err(message) => {
            let _ = ready.send(Err(message));
            clear_context();
            return;
        }
    };
    let _ = ready.send(Ok(hwnd.0 as isize));

    // Win32 message loop, blocks until WM_QUIT.
    let mut msg = MSG::default();
    // SAFETY: Standard GetMessage/DispatchMessage loop pattern.
    unsafe {
        while GetMessageW(&mut msg, None, 0, 0).as_bool() {
            let _ = TranslateMessage(&msg);
            DispatchMessageW(&msg);
        }
        let _ = DestroyWindow(hwnd);
    }
    clear_context();
}

/// Creates the message-only window and registers it for keyboard raw input.
fn create_capture_window() -> Result<HWND, String> {
    let class_name = to_wstring(WINDOW_CLASS);
    // SAFETY: Window class registration and creation with a valid module
    // handle and a NUL-terminated class name kept alive for the calls.
    unsafe {
        let h_instance = GetModuleHandleW(None).map_err(|e| e.to_string())?;

        let wc = WNDCLASSW {
            lpfnWndProc: Some(window_proc),
            hInstance: HINSTANCE(h_instance.0),
            lpszClassName: PCWSTR(class_name.as_ptr()),
            ..Default::default()
        };
        // Re-registration after a previous session reports class-exists;
        // CreateWindowExW will fail anyway if something is really wrong.
        let _ = RegisterClassW(&wc);

        let hwnd = CreateWindowExW(
            WINDOW_EX_STYLE(0),
            PCWSTR(class_name.as_ptr()),
            PCWSTR::null(),
            WINDOW_STYLE(0),
            0,
            0,
            0,
            0,
            Some(HWND_MESSAGE),
            None,
            Some(HINSTANCE(h_instance.0)),
            None,
        )
        .map_err(|e| format!("failed to create message-only window: {e}"))?;

        let registration = [RAWINPUTDEVICE {
            usUsagePage: USAGE_PAGE_GENERIC,
            usUsage: USAGE_KEYBOARD,
            dwFlags: RIDEV_INPUTSINK | RIDEV_DEVNOTIFY,
            hwndTarget: hwnd,
        }];
        if let Err(e) =
            RegisterRawInputDevices(&registration, std::mem::size_of::<RAWINPUTDEVICE>() as u32)
        {
            let _ = DestroyWindow(hwnd);
            return Err(format!("failed to register for keyboard raw input: {e}"));
        }

        Ok(hwnd)
    }
}

/// Window procedure for the capture window.
///
/// Runs on the loop thread only. Must never panic across the FFI boundary.
unsafe extern "system" fn window_proc(
    hwnd: HWND,
    msg: u32,
    w_param: WPARAM,
    l_param: LPARAM,
) -> LRESULT {
    match msg {
        WM_INPUT => {
            if let Some(ctx) = context() {
                handle_raw_input(&ctx, l_param);
            }
            // SAFETY: Forwarding an unhandled portion of WM_INPUT is
            // required for proper cleanup of the input buffer.
            unsafe { DefWindowProcW(hwnd, msg, w_param, l_param) }
        }
        WM_INPUT_DEVICE_CHANGE => {
            if let Some(ctx) = context() {
                let handle = HANDLE(l_param.0 as _);
                match w_param.0 {
                    GIDC_ARRIVAL => handle_device_arrival(&ctx, handle),
                    GIDC_REMOVAL => handle_device_removal(&ctx, handle),
                    other => debug!(code = other, "unknown device-change code"),
                }
            }
            LRESULT(0)
        }
        WM_CLOSE | WM_DESTROY => {
            // SAFETY: Posting WM_QUIT to our own message loop.
            unsafe { PostQuitMessage(0) };
            LRESULT(0)
        }
        // SAFETY: Default handling for everything else.
        _ => unsafe { DefWindowProcW(hwnd, msg, w_param, l_param) },
    }
}

/// Decodes one WM_INPUT packet into a [`KeyEvent`].
fn handle_raw_input(ctx: &CaptureContext, l_param: LPARAM) {
    let mut buffer = [0u8; INPUT_BUFFER_SIZE];
    let mut size = buffer.len() as u32;
    // SAFETY: buffer is live and large enough for any keyboard RAWINPUT
    // packet; GetRawInputData fills it and reports the copied size.
    let copied = unsafe {
        GetRawInputData(
            HRAWINPUT(l_param.0 as _),
            RID_INPUT,
            Some(buffer.as_mut_ptr() as _),
            &mut size,
            std::mem::size_of::<RAWINPUTHEADER>() as u32,
        )
    };
    if copied == u32::MAX || copied == 0 {
        warn!("failed to read raw input packet");
        return;
    }

    // SAFETY: on success the buffer holds a RAWINPUT structure.
    let raw = unsafe { &*(buffer.as_ptr() as *const RAWINPUT) };
    if raw.header.dwType != RIM_TYPEKEYBOARD.0 {
        return;
    }
    // SAFETY: dwType == RIM_TYPEKEYBOARD selects the keyboard union arm.
    let keyboard = unsafe { raw.data.keyboard };

    let state = if keyboard.Flags & RI_KEY_BREAK != 0 {
        KeyState::Up
    } else {
        KeyState::Down
    };
    let device = ctx.registry.stable_id(raw.header.hDevice.0 as u64);
    let event = KeyEvent::now(
        device,
        keyboard.MakeCode as u32,
        keyboard.VKey as u32,
        state,
    );
    // A send error means the consumer is shutting down.
    let _ = ctx.keys.send(event);
}

fn handle_device_arrival(ctx: &CaptureContext, handle: HANDLE) {
    if !is_keyboard_device(handle) {
        return;
    }
    let Some(path) = device_interface_path(handle) else {
        warn!("keyboard arrival without a readable interface path, skipping");
        return;
    };

    let native_handle = handle.0 as u64;
    let stable_id = windows_stable_id(&path, native_handle);
    let name = path
        .trim_start_matches(r"\\?\")
        .split('#')
        .nth(1)
        .unwrap_or(&path)
        .to_string();
    let device = Device {
        native_handle,
        stable_id,
        name,
        path,
    };

    if ctx.registry.insert(device.clone()) {
        info!(stable_id = %device.stable_id, "keyboard device attached");
        let _ = ctx.devices.send(DeviceEvent {
            device,
            attached: true,
        });
    }
}

fn handle_device_removal(ctx: &CaptureContext, handle: HANDLE) {
    if let Some(device) = ctx.registry.remove(handle.0 as u64) {
        info!(stable_id = %device.stable_id, "keyboard device detached");
        let _ = ctx.devices.send(DeviceEvent {
            device,
            attached: false,
        });
    }
}

/// `true` when the raw-input device reports itself as a keyboard.
fn is_keyboard_device(handle: HANDLE) -> bool {
    let mut size = 0u32;
    // SAFETY: Two-call query pattern for RIDI_DEVICEINFO with a correctly
    // sized output buffer.
    unsafe {
        if GetRawInputDeviceInfoW(Some(handle), RIDI_DEVICEINFO, None, &mut size) != 0 {
            return false;
        }
        let mut buffer = vec![0u8; size as usize];
        let result = GetRawInputDeviceInfoW(
            Some(handle),
            RIDI_DEVICEINFO,
            Some(buffer.as_mut_ptr() as _),
            &mut size,
        );
        if result == u32::MAX {
            return false;
        }
        let info = &*(buffer.as_ptr() as *const RID_DEVICE_INFO);
        info.dwType == RIM_TYPEKEYBOARD
    }
}

/// Device interface path (`\\?\HID#...`) for a raw-input device handle.
fn device_interface_path(handle: HANDLE) -> Option<String> {
    let mut size = 0u32;
    // SAFETY: Two-call query pattern for RIDI_DEVICENAME; `size` is a
    // character count for the UTF-16 buffer.
    unsafe {
        if GetRawInputDeviceInfoW(Some(handle), RIDI_DEVICENAME, None, &mut size) != 0 || size == 0
        {
            return None;
        }
        let mut buffer = vec![0u16; size as usize];
        let result = GetRawInputDeviceInfoW(
            Some(handle),
            RIDI_DEVICENAME,
            Some(buffer.as_mut_ptr() as _),
            &mut size,
        );
        if result == u32::MAX {
            return None;
        }
        Some(String::from_utf16_lossy(&buffer).trim_end_matches('\0').to_string())
    }
}
