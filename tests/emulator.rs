use nuimo_emulator::domain::codec::encode_led_matrix;
use nuimo_emulator::domain::models::{
    AdvertiseFailure, ConnectionState, GattStatus, NuimoEvent, PeerId, PeripheralPhase,
    RadioState, SwipeDirection, TransportEvent,
};
use nuimo_emulator::domain::profile::{
    CHARACTERISTIC_NOTIFICATION_DESCRIPTOR_UUID, ENABLE_NOTIFICATION_VALUE,
    LED_MATRIX_CHARACTERISTIC_UUID, SENSOR_ROTATION_CHARACTERISTIC_UUID,
    SENSOR_TOUCH_CHARACTERISTIC_UUID,
};
use nuimo_emulator::domain::settings::Settings;
use nuimo_emulator::infrastructure::bluetooth::simulated::{RadioMonitor, SimulatedRadio};
use nuimo_emulator::infrastructure::bluetooth::{transport_channel, EmulatorHandle, EmulatorService};
use tokio::sync::mpsc;

fn start(radio: SimulatedRadio) -> (EmulatorHandle, mpsc::UnboundedReceiver<NuimoEvent>, RadioMonitor) {
    let (transport_tx, transport_rx) = transport_channel();
    let radio = radio.with_loopback(transport_tx);
    let monitor = radio.monitor();
    let (handle, events) = EmulatorService::spawn(radio, &Settings::default(), transport_rx);
    (handle, events, monitor)
}

fn drain(events: &mut mpsc::UnboundedReceiver<NuimoEvent>) -> Vec<NuimoEvent> {
    let mut received = Vec::new();
    while let Ok(event) = events.try_recv() {
        received.push(event);
    }
    received
}

fn connection(peer: &PeerId, state: ConnectionState) -> TransportEvent {
    TransportEvent::ConnectionStateChanged {
        peer: peer.clone(),
        status: GattStatus::Success,
        state,
    }
}

fn subscribe(peer: &PeerId, request_id: i32, characteristic: uuid::Uuid) -> TransportEvent {
    TransportEvent::DescriptorWriteRequest {
        peer: peer.clone(),
        request_id,
        characteristic,
        descriptor: CHARACTERISTIC_NOTIFICATION_DESCRIPTOR_UUID,
        prepared_write: false,
        response_needed: true,
        offset: 0,
        value: Some(ENABLE_NOTIFICATION_VALUE.to_vec()),
    }
}

#[tokio::test]
async fn test_full_session() {
    let (handle, mut events, monitor) = start(SimulatedRadio::new());
    let phone = PeerId::new("phone");

    handle.set_enabled(true).unwrap();
    assert_eq!(handle.status().await.unwrap().phase, PeripheralPhase::Advertising);
    assert_eq!(
        drain(&mut events),
        vec![NuimoEvent::PowerOn, NuimoEvent::StartAdvertising]
    );

    handle.transport_event(connection(&phone, ConnectionState::Connected)).unwrap();
    handle.transport_event(subscribe(&phone, 1, SENSOR_TOUCH_CHARACTERISTIC_UUID)).unwrap();
    handle.transport_event(subscribe(&phone, 2, SENSOR_ROTATION_CHARACTERISTIC_UUID)).unwrap();
    handle.swipe(SwipeDirection::Down).unwrap();
    handle.rotate(0.5).unwrap();

    let status = handle.status().await.unwrap();
    assert_eq!(status.phase, PeripheralPhase::Connected);
    assert_eq!(
        drain(&mut events),
        vec![NuimoEvent::StopAdvertising, NuimoEvent::Connect(phone.clone())]
    );
    assert_eq!(
        monitor.notifications(),
        vec![
            (SENSOR_TOUCH_CHARACTERISTIC_UUID, vec![3]),
            (SENSOR_ROTATION_CHARACTERISTIC_UUID, vec![0x78, 0x05]),
        ]
    );

    // LED matrix: response first, then the event
    let mut payload = [0u8; 13];
    payload[1] = 0b1010_0000;
    payload[11] = 255;
    payload[12] = 5;
    handle
        .transport_event(TransportEvent::CharacteristicWriteRequest {
            peer: phone.clone(),
            request_id: 3,
            characteristic: LED_MATRIX_CHARACTERISTIC_UUID,
            prepared_write: false,
            response_needed: true,
            offset: 0,
            value: Some(payload.to_vec()),
        })
        .unwrap();
    handle.status().await.unwrap();

    let events_now = drain(&mut events);
    let [NuimoEvent::ReceiveLedMatrix(command)] = events_now.as_slice() else {
        panic!("unexpected events {:?}", events_now);
    };
    assert!(command.cells[13] && command.cells[15]);
    assert_eq!(command.lit_count(), 2);
    assert_eq!(encode_led_matrix(command), payload);
    assert_eq!(monitor.responses().last(), Some(&(3, GattStatus::Success, vec![])));

    // Disconnect resumes advertising
    handle.transport_event(connection(&phone, ConnectionState::Disconnected)).unwrap();
    let status = handle.status().await.unwrap();
    assert!(status.is_advertising);
    assert_eq!(status.connected_peer, None);
    assert_eq!(
        drain(&mut events),
        vec![NuimoEvent::Disconnect(phone.clone()), NuimoEvent::StartAdvertising]
    );

    // Notifications stop after disconnect
    let sent = monitor.notifications().len();
    handle.swipe(SwipeDirection::Left).unwrap();
    handle.status().await.unwrap();
    assert_eq!(monitor.notifications().len(), sent);

    handle.shutdown().unwrap();
    let mut remaining = Vec::new();
    while let Some(event) = events.recv().await {
        remaining.push(event);
    }
    assert_eq!(
        remaining,
        vec![NuimoEvent::StopAdvertising, NuimoEvent::PowerOff]
    );
    assert_eq!(monitor.device_name().as_deref(), Some("host"));
}

#[tokio::test]
async fn test_radio_toggle_restarts_emulator() {
    let (handle, mut events, monitor) = start(SimulatedRadio::new());
    handle.set_enabled(true).unwrap();
    handle.status().await.unwrap();
    drain(&mut events);

    monitor.set_radio_state(RadioState::Off);
    handle
        .transport_event(TransportEvent::RadioStateChanged(RadioState::Off))
        .unwrap();
    assert_eq!(handle.status().await.unwrap().phase, PeripheralPhase::Off);

    monitor.set_radio_state(RadioState::On);
    handle
        .transport_event(TransportEvent::RadioStateChanged(RadioState::On))
        .unwrap();
    assert_eq!(handle.status().await.unwrap().phase, PeripheralPhase::Advertising);

    assert_eq!(
        drain(&mut events),
        vec![
            NuimoEvent::StopAdvertising,
            NuimoEvent::PowerOff,
            NuimoEvent::PowerOn,
            NuimoEvent::StartAdvertising,
        ]
    );
}

#[tokio::test]
async fn test_unsupported_host() {
    let (handle, mut events, _monitor) = start(SimulatedRadio::without_advertiser());
    handle.set_enabled(true).unwrap();

    let status = handle.status().await.unwrap();
    assert!(!status.is_on);
    assert_eq!(status.phase, PeripheralPhase::Off);
    assert_eq!(
        drain(&mut events),
        vec![NuimoEvent::StartAdvertisingFailure(
            AdvertiseFailure::FeatureUnsupported
        )]
    );
}

#[tokio::test]
async fn test_no_radio() {
    let (handle, mut events, _monitor) = start(SimulatedRadio::without_radio());
    handle.set_enabled(true).unwrap();

    let status = handle.status().await.unwrap();
    assert!(!status.radio_supported);
    assert!(!status.is_on);
    assert!(drain(&mut events).is_empty());
}
