//! Barcode framing state machine.
//!
//! Consumes per-device key down/up events and produces completed barcode
//! strings according to the configured [`FramingConfig`]. The machine runs
//! `Idle → ReadingHeader → ReadingData → Idle`; `ReadingHeader` is skipped
//! when no header is configured.
//!
//! Two timeouts govern segmentation:
//!
//! - **Inter-key timeout** (300 ms): a key-down arriving more than 300 ms
//!   after the previous one discards any partial read before processing, so
//!   a stale fragment never merges with an unrelated keypress burst.
//! - **Trailer timeout** (300 ms): when no header, trailer, or fixed length
//!   is configured at all, a one-shot timer re-armed after every accepted
//!   character treats the accumulated buffer as a completed barcode once the
//!   burst goes quiet.
//!
//! # Concurrency
//!
//! Framer state lives behind a single mutex so the trailer-timer thread and
//! the key-delivery path never interleave their reads and writes. Each
//! framer instance expects one serialized event stream; the router provides
//! that serialization when multiple backends or devices are in play.

use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use tracing::warn;

use crate::domain::device::{BarcodeRead, DeviceId, KeyEvent, KeyState};
use crate::domain::framing::FramingConfig;
use crate::scancode;

/// Maximum pause between two keystrokes of the same barcode.
pub const INTER_KEY_TIMEOUT: Duration = Duration::from_millis(300);

/// Quiet period after which an auto-mode read is considered complete.
pub const TRAILER_TIMEOUT: Duration = Duration::from_millis(300);

/// Callback invoked with every completed read. Runs on whichever thread
/// completed the barcode: the event-delivery thread or the timer thread.
pub type BarcodeHandler = Box<dyn Fn(BarcodeRead) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FramerStatus {
    /// No header byte received yet.
    Idle,
    /// Accumulating characters until the header suffix matches.
    ReadingHeader,
    /// Accumulating payload characters until a completion rule fires.
    ReadingData,
}

/// Result of feeding one key event through the state machine.
enum KeyOutcome {
    None,
    /// A barcode completed; the state has already been reset.
    Completed(BarcodeRead),
    /// Auto mode accepted a character; (re)arm the trailer timer.
    ArmTimer,
}

struct FramerState {
    status: FramerStatus,
    header_accum: String,
    data_accum: String,
    shift_down: bool,
    last_key_at: Option<Instant>,
    /// Device that produced the most recent event; used to tag completed
    /// reads, including timer-driven ones.
    owner: Option<DeviceId>,
}

impl FramerState {
    fn new() -> Self {
        Self {
            status: FramerStatus::Idle,
            header_accum: String::new(),
            data_accum: String::new(),
            shift_down: false,
            last_key_at: None,
            owner: None,
        }
    }

    fn reset(&mut self) {
        self.status = FramerStatus::Idle;
        self.header_accum.clear();
        self.data_accum.clear();
        self.shift_down = false;
    }

    fn process(&mut self, config: &FramingConfig, event: &KeyEvent) -> KeyOutcome {
        if event.state == KeyState::Up {
            if scancode::is_shift(event.scan_code) {
                self.shift_down = false;
            }
            return KeyOutcome::None;
        }

        // A long pause means any partial read is stale; discard it and let
        // this key start a fresh barcode.
        if let Some(last) = self.last_key_at {
            if event.timestamp.saturating_duration_since(last) > INTER_KEY_TIMEOUT {
                self.reset();
            }
        }
        self.last_key_at = Some(event.timestamp);

        // Translate with the shift state as it was before this key.
        let ch = scancode::char_for(event.scan_code, self.shift_down);
        if scancode::is_shift(event.scan_code) {
            self.shift_down = true;
        }

        if self.status == FramerStatus::Idle {
            if config.header.is_empty() {
                self.status = FramerStatus::ReadingData;
            } else {
                self.status = FramerStatus::ReadingHeader;
                self.header_accum.clear();
            }
        }

        if self.status == FramerStatus::ReadingHeader {
            if ch != scancode::NUL {
                self.header_accum.push(ch);
            }
            if self.header_accum.ends_with(&config.header) {
                self.status = FramerStatus::ReadingData;
            }
            // The key that completes the header belongs to the header, not
            // the payload.
            return KeyOutcome::None;
        }

        if self.status == FramerStatus::ReadingData && ch != scancode::NUL {
            self.data_accum.push(ch);

            if config.fixed_length > 0 && self.data_accum.len() == config.fixed_length {
                return self.complete(config, false);
            }
            if !config.trailer.is_empty()
                && self.data_accum.len() > config.trailer.len()
                && self.data_accum.ends_with(&config.trailer)
            {
                return self.complete(config, true);
            }
            if config.is_auto_terminated() {
                return KeyOutcome::ArmTimer;
            }
        }

        KeyOutcome::None
    }

    /// Completion path shared by all three triggers (fixed length, trailer
    /// match, trailer timeout). The trailer is stripped only when trailer
    /// matching detected the end of the read.
    fn complete(&mut self, config: &FramingConfig, trailer_used: bool) -> KeyOutcome {
        let mut barcode = std::mem::take(&mut self.data_accum);
        if trailer_used {
            let stripped = barcode.len().saturating_sub(config.trailer.len());
            barcode.truncate(stripped);
        }
        let owner = self.owner.clone();
        self.reset();
        if barcode.is_empty() {
            KeyOutcome::None
        } else {
            KeyOutcome::Completed(BarcodeRead {
                device: owner,
                barcode,
            })
        }
    }
}

struct FramerShared {
    config: FramingConfig,
    on_barcode: BarcodeHandler,
    state: Mutex<FramerState>,
}

impl FramerShared {
    fn lock_state(&self) -> std::sync::MutexGuard<'_, FramerState> {
        self.state.lock().expect("framer state lock poisoned")
    }

    /// Timer-expiry path: emit the current buffer as a completed read if the
    /// burst ended mid-`ReadingData`.
    fn complete_on_timeout(&self) -> Option<BarcodeRead> {
        let mut state = self.lock_state();
        if state.status != FramerStatus::ReadingData || state.data_accum.is_empty() {
            return None;
        }
        match state.complete(&self.config, false) {
            KeyOutcome::Completed(read) => Some(read),
            _ => None,
        }
    }
}

enum TimerCommand {
    Arm,
    Cancel,
    Shutdown,
}

/// The barcode framing state machine for one logical scanner stream.
///
/// Constructed with an immutable [`FramingConfig`] and a completion
/// callback. In auto/timeout mode a dedicated timer thread implements the
/// one-shot trailer timeout; in every other mode no thread is spawned.
pub struct BarcodeFramer {
    shared: Arc<FramerShared>,
    timer_tx: Option<Sender<TimerCommand>>,
    timer_thread: Option<JoinHandle<()>>,
}

impl BarcodeFramer {
    /// Creates a framer with the given framing rules.
    ///
    /// `on_barcode` is invoked synchronously for every completed read, on
    /// the thread that completed it.
    pub fn new(config: FramingConfig, on_barcode: impl Fn(BarcodeRead) + Send + Sync + 'static) -> Self {
        let shared = Arc::new(FramerShared {
            config,
            on_barcode: Box::new(on_barcode),
            state: Mutex::new(FramerState::new()),
        });

        let (timer_tx, timer_thread) = if shared.config.is_auto_terminated() {
            let (tx, rx) = crossbeam_channel::unbounded();
            let timer_shared = Arc::clone(&shared);
            match thread::Builder::new()
                .name("scanhook-trailer-timer".to_string())
                .spawn(move || run_trailer_timer(rx, timer_shared))
            {
                Ok(handle) => (Some(tx), Some(handle)),
                Err(e) => {
                    // Degrade to "no auto-segmentation" rather than failing
                    // framer construction.
                    warn!("failed to spawn trailer-timeout timer thread: {e}");
                    (None, None)
                }
            }
        } else {
            (None, None)
        };

        Self {
            shared,
            timer_tx,
            timer_thread,
        }
    }

    /// Feeds one key event through the state machine, invoking the
    /// completion callback if this event finished a barcode.
    pub fn handle_event(&self, event: &KeyEvent) {
        let outcome = {
            let mut state = self.shared.lock_state();
            state.owner = event.device.clone();
            state.process(&self.shared.config, event)
        };
        match outcome {
            KeyOutcome::Completed(read) => {
                self.send_timer_command(TimerCommand::Cancel);
                (self.shared.on_barcode)(read);
            }
            KeyOutcome::ArmTimer => self.send_timer_command(TimerCommand::Arm),
            KeyOutcome::None => {}
        }
    }

    /// Forces the machine back to `Idle` with cleared accumulators and a
    /// disarmed timer. Used by the router on an owning-device switch.
    pub fn force_idle(&self) {
        self.shared.lock_state().reset();
        self.send_timer_command(TimerCommand::Cancel);
    }

    fn send_timer_command(&self, command: TimerCommand) {
        if let Some(tx) = &self.timer_tx {
            // A send error means the timer thread already exited; nothing
            // left to arm or cancel.
            let _ = tx.send(command);
        }
    }
}

impl Drop for BarcodeFramer {
    fn drop(&mut self) {
        if let Some(tx) = self.timer_tx.take() {
            let _ = tx.send(TimerCommand::Shutdown);
        }
        if let Some(handle) = self.timer_thread.take() {
            let _ = handle.join();
        }
    }
}

/// Timer thread body: waits for arm/cancel commands, firing the timeout
/// completion path when an armed deadline elapses with no further command.
fn run_trailer_timer(rx: Receiver<TimerCommand>, shared: Arc<FramerShared>) {
    let mut deadline: Option<Instant> = None;
    loop {
        let command = match deadline {
            Some(at) => match rx.recv_deadline(at) {
                Ok(command) => command,
                Err(RecvTimeoutError::Timeout) => {
                    deadline = None;
                    if let Some(read) = shared.complete_on_timeout() {
                        (shared.on_barcode)(read);
                    }
                    continue;
                }
                Err(RecvTimeoutError::Disconnected) => return,
            },
            None => match rx.recv() {
                Ok(command) => command,
                Err(_) => return,
            },
        };
        match command {
            TimerCommand::Arm => deadline = Some(Instant::now() + TRAILER_TIMEOUT),
            TimerCommand::Cancel => deadline = None,
            TimerCommand::Shutdown => return,
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::unbounded;
    use std::time::Duration;

    /// Scan codes for the characters used in the tests.
    const SC_1: u32 = 2;
    const SC_2: u32 = 3;
    const SC_3: u32 = 4;
    const SC_4: u32 = 5;
    const SC_6: u32 = 7; // shifted: '^'
    const SC_7: u32 = 8;
    const SC_8: u32 = 9;
    const SC_9: u32 = 10;
    const SC_A: u32 = 30;
    const SC_B: u32 = 48;
    const SC_C: u32 = 46;
    const SC_D: u32 = 32;
    const SC_E: u32 = 18;
    const SC_X: u32 = 45;
    const SC_ENTER: u32 = 28;
    const SC_F1: u32 = 59; // out of table -> NUL

    fn collecting_framer(config: FramingConfig) -> (BarcodeFramer, Receiver<BarcodeRead>) {
        let (tx, rx) = unbounded();
        let framer = BarcodeFramer::new(config, move |read| {
            let _ = tx.send(read);
        });
        (framer, rx)
    }

    fn key(scan_code: u32, state: KeyState, at: Instant) -> KeyEvent {
        KeyEvent {
            device: Some("D1".to_string()),
            scan_code,
            virtual_key: scan_code,
            state,
            timestamp: at,
        }
    }

    /// Types each scan code as a down+up pair, 1 ms apart.
    fn type_codes(framer: &BarcodeFramer, codes: &[u32], start: Instant) -> Instant {
        let mut at = start;
        for &code in codes {
            framer.handle_event(&key(code, KeyState::Down, at));
            framer.handle_event(&key(code, KeyState::Up, at));
            at += Duration::from_millis(1);
        }
        at
    }

    #[test]
    fn test_default_config_emits_on_carriage_return() {
        let (framer, rx) = collecting_framer(FramingConfig::default());
        type_codes(&framer, &[SC_1, SC_2, SC_3, SC_4, SC_ENTER], Instant::now());

        let read = rx.try_recv().expect("one barcode expected");
        assert_eq!(read.barcode, "1234");
        assert_eq!(read.device.as_deref(), Some("D1"));
        assert!(rx.try_recv().is_err(), "exactly one emission expected");
    }

    #[test]
    fn test_trailer_is_not_part_of_the_output() {
        let (framer, rx) = collecting_framer(FramingConfig::default());
        type_codes(&framer, &[SC_A, SC_B, SC_ENTER], Instant::now());

        assert_eq!(rx.try_recv().expect("barcode").barcode, "ab");
    }

    #[test]
    fn test_trailer_alone_does_not_complete() {
        // The accumulator must be strictly longer than the trailer.
        let (framer, rx) = collecting_framer(FramingConfig::default());
        type_codes(&framer, &[SC_ENTER], Instant::now());

        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_fixed_length_completes_without_trailer() {
        let config = FramingConfig {
            header: String::new(),
            trailer: String::new(),
            fixed_length: 5,
        };
        let (framer, rx) = collecting_framer(config);
        type_codes(&framer, &[SC_A, SC_B, SC_C, SC_D, SC_E], Instant::now());

        let read = rx.try_recv().expect("barcode after 5th character");
        assert_eq!(read.barcode, "abcde");
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_fixed_length_wins_over_trailer_and_keeps_full_payload() {
        // Completion via length must not strip the configured trailer.
        let config = FramingConfig {
            header: String::new(),
            trailer: "\r".to_string(),
            fixed_length: 3,
        };
        let (framer, rx) = collecting_framer(config);
        type_codes(&framer, &[SC_1, SC_2, SC_3], Instant::now());

        assert_eq!(rx.try_recv().expect("barcode").barcode, "123");
    }

    #[test]
    fn test_header_prefix_is_discarded() {
        let config = FramingConfig {
            header: "^".to_string(),
            trailer: "\r".to_string(),
            fixed_length: 0,
        };
        let (framer, rx) = collecting_framer(config);

        // "X^9876\r": '^' is shift+6, so wrap the shift key around it.
        let start = Instant::now();
        let mut at = type_codes(&framer, &[SC_X], start);
        framer.handle_event(&key(scancode::LEFT_SHIFT, KeyState::Down, at));
        at += Duration::from_millis(1);
        at = type_codes(&framer, &[SC_6], at);
        framer.handle_event(&key(scancode::LEFT_SHIFT, KeyState::Up, at));
        at += Duration::from_millis(1);
        type_codes(&framer, &[SC_9, SC_8, SC_7, SC_6, SC_ENTER], at);

        let read = rx.try_recv().expect("one barcode expected");
        assert_eq!(read.barcode, "9876");
    }

    #[test]
    fn test_shift_produces_uppercase_until_released() {
        let (framer, rx) = collecting_framer(FramingConfig::default());
        let start = Instant::now();

        framer.handle_event(&key(scancode::LEFT_SHIFT, KeyState::Down, start));
        let at = type_codes(&framer, &[SC_A, SC_B], start + Duration::from_millis(1));
        framer.handle_event(&key(scancode::LEFT_SHIFT, KeyState::Up, at));
        type_codes(&framer, &[SC_C, SC_ENTER], at + Duration::from_millis(1));

        assert_eq!(rx.try_recv().expect("barcode").barcode, "ABc");
    }

    #[test]
    fn test_long_pause_discards_partial_read() {
        let (framer, rx) = collecting_framer(FramingConfig::default());
        let start = Instant::now();

        type_codes(&framer, &[SC_1, SC_2], start);
        // Resume more than 300 ms later: the "12" fragment must not merge.
        let late = start + Duration::from_millis(400);
        type_codes(&framer, &[SC_3, SC_4, SC_ENTER], late);

        let read = rx.try_recv().expect("one barcode expected");
        assert_eq!(read.barcode, "34");
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_non_printable_keys_are_ignored() {
        let (framer, rx) = collecting_framer(FramingConfig::default());
        type_codes(&framer, &[SC_1, SC_F1, SC_2, SC_ENTER], Instant::now());

        assert_eq!(rx.try_recv().expect("barcode").barcode, "12");
    }

    #[test]
    fn test_consecutive_barcodes_each_emit_once() {
        let (framer, rx) = collecting_framer(FramingConfig::default());
        let start = Instant::now();
        let at = type_codes(&framer, &[SC_1, SC_2, SC_ENTER], start);
        type_codes(&framer, &[SC_3, SC_4, SC_ENTER], at);

        assert_eq!(rx.try_recv().expect("first").barcode, "12");
        assert_eq!(rx.try_recv().expect("second").barcode, "34");
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_auto_mode_emits_after_quiet_period() {
        let config = FramingConfig {
            header: String::new(),
            trailer: String::new(),
            fixed_length: 0,
        };
        let (framer, rx) = collecting_framer(config);
        type_codes(&framer, &[SC_1, SC_2, SC_3], Instant::now());

        // Real-time wait: the trailer timer fires after 300 ms of silence.
        let read = rx
            .recv_timeout(TRAILER_TIMEOUT + Duration::from_millis(500))
            .expect("timeout emission expected");
        assert_eq!(read.barcode, "123");
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_auto_mode_timer_rearms_per_key() {
        let config = FramingConfig {
            header: String::new(),
            trailer: String::new(),
            fixed_length: 0,
        };
        let (framer, rx) = collecting_framer(config);

        // Keys 100 ms apart keep re-arming the timer; no emission while the
        // burst is alive.
        let mut at = Instant::now();
        for code in [SC_1, SC_2, SC_3] {
            framer.handle_event(&key(code, KeyState::Down, at));
            framer.handle_event(&key(code, KeyState::Up, at));
            assert!(rx.try_recv().is_err(), "no emission mid-burst");
            std::thread::sleep(Duration::from_millis(100));
            at = Instant::now();
        }

        let read = rx
            .recv_timeout(TRAILER_TIMEOUT + Duration::from_millis(500))
            .expect("emission after the burst ends");
        assert_eq!(read.barcode, "123");
    }

    #[test]
    fn test_force_idle_discards_partial_read() {
        let (framer, rx) = collecting_framer(FramingConfig::default());
        let start = Instant::now();
        let at = type_codes(&framer, &[SC_1, SC_2], start);

        framer.force_idle();
        type_codes(&framer, &[SC_3, SC_ENTER], at);

        assert_eq!(rx.try_recv().expect("barcode").barcode, "3");
    }
}
