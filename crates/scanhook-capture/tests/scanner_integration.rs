//! End-to-end pipeline tests: mock backend → scanner → router → framer.

use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver};
use scanhook_capture::backend::mock::MockKeyboardCapture;
use scanhook_capture::BarcodeScanner;
use scanhook_core::{BarcodeRead, Device, DeviceEvent, FramingConfig, KeyEvent, KeyState};

const RECV_TIMEOUT: Duration = Duration::from_secs(1);

const SC_1: u32 = 2;
const SC_2: u32 = 3;
const SC_3: u32 = 4;
const SC_4: u32 = 5;
const SC_ENTER: u32 = 28;

fn test_device(handle: u64) -> Device {
    Device {
        native_handle: handle,
        stable_id: format!("D{handle}"),
        name: format!("mock scanner {handle}"),
        path: format!("/dev/mock/{handle}"),
    }
}

/// Injects each scan code as a down+up pair attributed to `device`.
fn type_codes(mock: &MockKeyboardCapture, device: &str, codes: &[u32]) {
    for &code in codes {
        for state in [KeyState::Down, KeyState::Up] {
            mock.inject_key(KeyEvent::now(Some(device.to_string()), code, code, state));
        }
    }
}

fn scanner_with_mock(
    framing: FramingConfig,
    filter: &str,
) -> (
    BarcodeScanner,
    MockKeyboardCapture,
    Receiver<BarcodeRead>,
    Receiver<DeviceEvent>,
) {
    let mock = MockKeyboardCapture::new();
    let (barcode_tx, barcode_rx) = unbounded();
    let (device_tx, device_rx) = unbounded();
    let scanner = BarcodeScanner::new(
        framing,
        filter,
        Box::new(mock.clone()),
        move |read| {
            let _ = barcode_tx.send(read);
        },
        move |event| {
            let _ = device_tx.send(event);
        },
    );
    (scanner, mock, barcode_rx, device_rx)
}

#[test]
fn test_full_pipeline_emits_barcode_with_device_id() {
    // Arrange
    let (mut scanner, mock, barcodes, _devices) =
        scanner_with_mock(FramingConfig::default(), "");
    scanner.start().expect("start should succeed");
    mock.attach_device(test_device(1));

    // Act
    type_codes(&mock, "D1", &[SC_1, SC_2, SC_3, SC_4, SC_ENTER]);

    // Assert
    let read = barcodes.recv_timeout(RECV_TIMEOUT).expect("one barcode");
    assert_eq!(read.barcode, "1234");
    assert_eq!(read.device.as_deref(), Some("D1"));
}

#[test]
fn test_device_change_callbacks_fire_for_attach_and_detach() {
    // Arrange
    let (mut scanner, mock, _barcodes, devices) =
        scanner_with_mock(FramingConfig::default(), "");
    scanner.start().expect("start should succeed");

    // Act
    mock.attach_device(test_device(1));
    mock.detach_device(1);

    // Assert
    let arrival = devices.recv_timeout(RECV_TIMEOUT).expect("arrival");
    assert!(arrival.attached);
    assert_eq!(arrival.device.stable_id, "D1");
    let removal = devices.recv_timeout(RECV_TIMEOUT).expect("removal");
    assert!(!removal.attached);
}

#[test]
fn test_filtered_scanner_ignores_other_devices() {
    // Arrange
    let (mut scanner, mock, barcodes, _devices) =
        scanner_with_mock(FramingConfig::default(), "D1");
    scanner.start().expect("start should succeed");

    // Act: D2 interleaves with D1's read.
    type_codes(&mock, "D1", &[SC_1, SC_2]);
    type_codes(&mock, "D2", &[SC_3, SC_4, SC_ENTER]);
    type_codes(&mock, "D1", &[SC_3, SC_4, SC_ENTER]);

    // Assert
    let read = barcodes.recv_timeout(RECV_TIMEOUT).expect("one barcode");
    assert_eq!(read.barcode, "1234");
    assert_eq!(read.device.as_deref(), Some("D1"));
    assert!(barcodes.try_recv().is_err(), "nothing attributable to D2");
}

#[test]
fn test_open_mode_isolates_concurrent_devices() {
    // Arrange
    let (mut scanner, mock, barcodes, _devices) =
        scanner_with_mock(FramingConfig::default(), "");
    scanner.start().expect("start should succeed");

    // Act: D2 takes over mid-read; D1's fragment must not leak into its
    // barcode.
    type_codes(&mock, "D1", &[SC_1, SC_2]);
    type_codes(&mock, "D2", &[SC_3, SC_4, SC_ENTER]);

    // Assert
    let read = barcodes.recv_timeout(RECV_TIMEOUT).expect("one barcode");
    assert_eq!(read.barcode, "34");
    assert_eq!(read.device.as_deref(), Some("D2"));
}

#[test]
fn test_set_device_filter_at_runtime() {
    // Arrange
    let (mut scanner, mock, barcodes, _devices) =
        scanner_with_mock(FramingConfig::default(), "");
    scanner.start().expect("start should succeed");
    assert_eq!(scanner.device_filter(), "");

    // Act
    scanner.set_device_filter("D2");
    type_codes(&mock, "D1", &[SC_1, SC_ENTER]);
    type_codes(&mock, "D2", &[SC_2, SC_ENTER]);

    // Assert
    assert_eq!(scanner.device_filter(), "D2");
    let read = barcodes.recv_timeout(RECV_TIMEOUT).expect("one barcode");
    assert_eq!(read.barcode, "2");
    assert!(barcodes.try_recv().is_err());
}

#[test]
fn test_start_and_stop_are_idempotent() {
    // Arrange
    let (mut scanner, mock, barcodes, _devices) =
        scanner_with_mock(FramingConfig::default(), "");

    // Act + Assert: double start is a no-op, not an error.
    scanner.start().expect("first start");
    scanner.start().expect("second start is a no-op");
    assert!(scanner.is_running());

    scanner.stop();
    scanner.stop();
    assert!(!scanner.is_running());

    // Restart works and the pipeline is live again.
    scanner.start().expect("restart");
    type_codes(&mock, "D1", &[SC_1, SC_ENTER]);
    let read = barcodes.recv_timeout(RECV_TIMEOUT).expect("barcode after restart");
    assert_eq!(read.barcode, "1");
}

#[test]
fn test_list_devices_reflects_backend_registry() {
    // Arrange
    let (mut scanner, mock, _barcodes, devices) =
        scanner_with_mock(FramingConfig::default(), "");
    scanner.start().expect("start should succeed");

    // Act
    mock.attach_device(test_device(1));
    mock.attach_device(test_device(2));
    let _ = devices.recv_timeout(RECV_TIMEOUT);
    let _ = devices.recv_timeout(RECV_TIMEOUT);

    // Assert
    let mut ids: Vec<_> = scanner
        .list_devices()
        .into_iter()
        .map(|d| d.stable_id)
        .collect();
    ids.sort();
    assert_eq!(ids, vec!["D1", "D2"]);

    mock.detach_device(1);
    let _ = devices.recv_timeout(RECV_TIMEOUT);
    assert_eq!(scanner.list_devices().len(), 1);
}

#[test]
fn test_fixed_length_framing_through_the_pipeline() {
    // Arrange
    let framing = FramingConfig {
        header: String::new(),
        trailer: String::new(),
        fixed_length: 3,
    };
    let (mut scanner, mock, barcodes, _devices) = scanner_with_mock(framing, "");
    scanner.start().expect("start should succeed");

    // Act
    type_codes(&mock, "D1", &[SC_1, SC_2, SC_3]);

    // Assert: completes on the third character, no trailer needed.
    let read = barcodes.recv_timeout(RECV_TIMEOUT).expect("one barcode");
    assert_eq!(read.barcode, "123");
}
