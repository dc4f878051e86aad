//! Windows low-level keyboard hook capture backend.
//!
//! Fallback for environments where raw input is unavailable (some RDP and
//! service session configurations). Installs a `WH_KEYBOARD_LL` hook on a
//! dedicated message loop thread. The hook sees every keystroke system-wide
//! but the OS strips device identity on this path, so events carry
//! `device: None` and [`KeyboardCapture::list_devices`] is always empty;
//! the router can only run in Open mode against this backend.
//!
//! `WH_KEYBOARD_LL` is inherently process-global, so installation is
//! coordinated through a reference-counted module-level state: the first
//! subscriber installs the hook thread, later subscribers share it, and the
//! last one to stop tears it down. Every event is forwarded down the hook
//! chain unmodified; capture never swallows keystrokes from the rest of the
//! system.
//!
//! # Safety
//!
//! `unsafe` is confined to the hook installation, the message loop, and the
//! hook callback. The callback must return quickly (the OS silently removes
//! hooks that stall) so it only copies the event into a channel.

#![cfg(target_os = "windows")]

use std::sync::Mutex;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, unbounded, Sender};
use scanhook_core::{Device, KeyEvent, KeyState};
use tracing::{info, warn};

use windows::Win32::Foundation::{LPARAM, LRESULT, WPARAM};
use windows::Win32::System::Threading::GetCurrentThreadId;
use windows::Win32::UI::WindowsAndMessaging::{
    CallNextHookEx, DispatchMessageW, GetMessageW, PostThreadMessageW, SetWindowsHookExW,
    UnhookWindowsHookEx, HC_ACTION, HHOOK, KBDLLHOOKSTRUCT, MSG, WH_KEYBOARD_LL, WM_KEYDOWN,
    WM_KEYUP, WM_QUIT, WM_SYSKEYDOWN, WM_SYSKEYUP,
};

use super::{CaptureError, CaptureStreams, KeyboardCapture};

/// One hook-event consumer, keyed so release can find it again.
struct Subscriber {
    id: u64,
    sender: Sender<KeyEvent>,
}

#[derive(Default)]
struct HookState {
    subscribers: Vec<Subscriber>,
    next_id: u64,
    /// `(loop thread id, join handle)` while the hook is installed.
    hook_thread: Option<(u32, JoinHandle<()>)>,
}

static HOOK_STATE: Mutex<HookState> = Mutex::new(HookState {
    subscribers: Vec::new(),
    next_id: 0,
    hook_thread: None,
});

fn lock_hook_state() -> std::sync::MutexGuard<'static, HookState> {
    HOOK_STATE.lock().expect("hook state lock poisoned")
}

/// Registers a subscriber, installing the shared hook if this is the first
/// one. Returns the subscriber id.
fn acquire_hook(sender: Sender<KeyEvent>) -> Result<u64, CaptureError> {
    let mut state = lock_hook_state();
    if state.hook_thread.is_none() {
        // First subscriber: bring up the hook thread and wait for it to
        // confirm installation.
        let (ready_tx, ready_rx) = bounded::<Result<u32, String>>(1);
        let thread = thread::Builder::new()
            .name("scanhook-llhook".to_string())
            .spawn(move || run_hook_message_loop(ready_tx))
            .map_err(|e| CaptureError::BackendInit(e.to_string()))?;
        match ready_rx.recv() {
            Ok(Ok(thread_id)) => {
                info!("low-level keyboard hook installed");
                state.hook_thread = Some((thread_id, thread));
            }
            Ok(Err(message)) => {
                let _ = thread.join();
                return Err(CaptureError::BackendInit(message));
            }
            Err(_) => {
                let _ = thread.join();
                return Err(CaptureError::BackendInit(
                    "hook thread exited before installation".to_string(),
                ));
            }
        }
    }

    let id = state.next_id;
    state.next_id += 1;
    state.subscribers.push(Subscriber { id, sender });
    Ok(id)
}

/// Drops a subscriber, tearing the hook down when it was the last one.
fn release_hook(id: u64) {
    let thread = {
        let mut state = lock_hook_state();
        state.subscribers.retain(|s| s.id != id);
        if state.subscribers.is_empty() {
            state.hook_thread.take()
        } else {
            None
        }
    };
    if let Some((thread_id, handle)) = thread {
        // SAFETY: Posting WM_QUIT to the hook loop thread is valid from any
        // thread and makes GetMessageW return 0.
        unsafe {
            let _ = PostThreadMessageW(thread_id, WM_QUIT, WPARAM(0), LPARAM(0));
        }
        let _ = handle.join();
        info!("low-level keyboard hook removed");
    }
}

/// Entry point for the dedicated hook message loop thread.
fn run_hook_message_loop(ready: Sender<Result<u32, String>>) {
    // SAFETY: SetWindowsHookExW requires the calling thread to run a message
    // loop, which this thread does right below.
    let hook: HHOOK = match unsafe { SetWindowsHookExW(WH_KEYBOARD_LL, Some(hook_proc), None, 0) } {
        Ok(hook) => hook,
        Err(e) => {
            let _ = ready.send(Err(format!("WH_KEYBOARD_LL installation failed: {e}")));
            return;
        }
    };
    // Thread id lets release_hook post WM_QUIT to this loop.
    let _ = ready.send(Ok(GetCurrentThreadId()));

    let mut msg = MSG::default();
    // SAFETY: Standard GetMessage/DispatchMessage loop; exits on WM_QUIT.
    unsafe {
        while GetMessageW(&mut msg, None, 0, 0).as_bool() {
            DispatchMessageW(&msg);
        }
        let _ = UnhookWindowsHookEx(hook);
    }
}

/// Low-level keyboard hook callback.
///
/// Called by Windows on the hook loop thread; must stay fast and must always
/// forward to the next hook in the chain.
unsafe extern "system" fn hook_proc(n_code: i32, w_param: WPARAM, l_param: LPARAM) -> LRESULT {
    if n_code != HC_ACTION as i32 {
        // SAFETY: Must call CallNextHookEx when n_code < 0.
        return unsafe { CallNextHookEx(None, n_code, w_param, l_param) };
    }

    // SAFETY: l_param points to a KBDLLHOOKSTRUCT when n_code == HC_ACTION.
    let kbs = unsafe { &*(l_param.0 as *const KBDLLHOOKSTRUCT) };

    let state = match w_param.0 as u32 {
        WM_KEYDOWN | WM_SYSKEYDOWN => Some(KeyState::Down),
        WM_KEYUP | WM_SYSKEYUP => Some(KeyState::Up),
        _ => None,
    };
    if let Some(state) = state {
        // No device identity exists on the hook path.
        let event = KeyEvent::now(None, kbs.scanCode, kbs.vkCode, state);
        let hook_state = lock_hook_state();
        for subscriber in &hook_state.subscribers {
            // Ignore send errors (subscriber shutting down).
            let _ = subscriber.sender.send(event.clone());
        }
    }

    // SAFETY: Forward the event to the next hook in the chain.
    unsafe { CallNextHookEx(None, n_code, w_param, l_param) }
}

/// Low-level hook capture backend.
pub struct GlobalHookCapture {
    subscription: Option<u64>,
    /// Kept alive so the (never used) devices channel stays connected while
    /// the backend runs.
    devices_tx: Option<Sender<scanhook_core::DeviceEvent>>,
}

impl GlobalHookCapture {
    pub fn new() -> Self {
        Self {
            subscription: None,
            devices_tx: None,
        }
    }
}

impl Default for GlobalHookCapture {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyboardCapture for GlobalHookCapture {
    fn start(&mut self) -> Result<CaptureStreams, CaptureError> {
        if self.subscription.is_some() {
            return Err(CaptureError::AlreadyRunning);
        }
        let (keys_tx, keys_rx) = unbounded();
        let (devices_tx, devices_rx) = unbounded();
        let id = acquire_hook(keys_tx)?;
        warn!("global-hook backend active: events carry no device identity");
        self.subscription = Some(id);
        self.devices_tx = Some(devices_tx);
        Ok(CaptureStreams {
            keys: keys_rx,
            devices: devices_rx,
        })
    }

    fn stop(&mut self) {
        if let Some(id) = self.subscription.take() {
            release_hook(id);
        }
        self.devices_tx = None;
    }

    fn list_devices(&self) -> Vec<Device> {
        // The hook path has no device enumeration.
        Vec::new()
    }
}

impl Drop for GlobalHookCapture {
    fn drop(&mut self) {
        self.stop();
    }
}
