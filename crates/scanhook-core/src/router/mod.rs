//! Multi-device event routing.
//!
//! Keyboard-emulating scanners all type into the same global event stream,
//! so two scanners firing concurrently would interleave their characters
//! inside a single framer buffer. The router sits in front of the framer
//! and applies one of two policies:
//!
//! - **Filtered**: a single device is selected and every other device's
//!   events are dropped before they reach the framer.
//! - **Open** (default): every device is accepted, but a change of
//!   originating device forces the framer back to `Idle` first, so a
//!   half-read barcode from one scanner never absorbs characters from
//!   another.

use std::sync::Mutex;

use tracing::debug;

use crate::domain::device::{DeviceId, KeyEvent};
use crate::framer::BarcodeFramer;

struct RouterState {
    /// `None` = Open mode. `Some(id)` = only `id` reaches the framer.
    filter: Option<DeviceId>,
    /// Device that produced the previous accepted event, for the Open-mode
    /// switch detection. `None` until the first attributed event arrives.
    last_device: Option<DeviceId>,
}

/// Routes key events from all capture backends into one [`BarcodeFramer`].
pub struct DeviceRouter {
    framer: BarcodeFramer,
    state: Mutex<RouterState>,
}

impl DeviceRouter {
    /// Wraps `framer` with an initial filter. An empty filter string selects
    /// Open mode.
    pub fn new(framer: BarcodeFramer, filter: impl Into<String>) -> Self {
        Self {
            framer,
            state: Mutex::new(RouterState {
                filter: normalize_filter(filter.into()),
                last_device: None,
            }),
        }
    }

    /// Replaces the device filter. An empty string switches to Open mode.
    /// Takes effect for the next event; any in-flight partial read is
    /// discarded so the old and new selections cannot blend.
    pub fn set_filter(&self, filter: impl Into<String>) {
        let mut state = self.lock_state();
        state.filter = normalize_filter(filter.into());
        state.last_device = None;
        drop(state);
        self.framer.force_idle();
    }

    /// Current filter; empty string in Open mode.
    pub fn filter(&self) -> String {
        self.lock_state().filter.clone().unwrap_or_default()
    }

    /// Feeds one captured key event through the routing policy and, if
    /// accepted, into the framer.
    pub fn handle_event(&self, event: &KeyEvent) {
        {
            let mut state = self.lock_state();
            match &state.filter {
                Some(wanted) => {
                    // Unattributed events cannot prove they came from the
                    // selected device, so they are dropped too.
                    if event.device.as_ref() != Some(wanted) {
                        debug!(device = ?event.device, "dropping event from unselected device");
                        return;
                    }
                }
                None => {
                    if state.last_device != event.device {
                        if state.last_device.is_some() {
                            debug!(
                                from = ?state.last_device,
                                to = ?event.device,
                                "device switch, discarding partial read"
                            );
                            self.framer.force_idle();
                        }
                        state.last_device = event.device.clone();
                    }
                }
            }
        }
        self.framer.handle_event(event);
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, RouterState> {
        self.state.lock().expect("router state lock poisoned")
    }
}

fn normalize_filter(filter: String) -> Option<DeviceId> {
    if filter.is_empty() {
        None
    } else {
        Some(filter)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
