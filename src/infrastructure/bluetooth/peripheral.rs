//! Nuimo Peripheral State Machine
//!
//! Owns all peripheral state and advances it one [`TransportEvent`] or one
//! collaborator call at a time. The caller is responsible for serializing
//! access; [`EmulatorService`](super::service::EmulatorService) does that with
//! a single task.

use crate::domain::codec::{self, NotificationFormat};
use crate::domain::models::{
    AdvertiseFailure, AdvertiseMode, AdvertiseRequest, ConnectionState, GattStatus, NuimoEvent,
    PeerId, PeripheralPhase, PeripheralStatus, RadioState, SwipeDirection, TransportEvent,
    TxPowerLevel,
};
use crate::domain::error::TransportError;
use crate::domain::profile::{
    self, CharacteristicDescriptor, Property, BATTERY_CHARACTERISTIC_UUID,
    CHARACTERISTIC_NOTIFICATION_DESCRIPTOR_UUID, DISABLE_NOTIFICATION_VALUE,
    ENABLE_NOTIFICATION_VALUE, LED_MATRIX_CHARACTERISTIC_UUID, SENSOR_BUTTON_CHARACTERISTIC_UUID,
    SENSOR_ROTATION_CHARACTERISTIC_UUID, SENSOR_SERVICE_UUID, SENSOR_TOUCH_CHARACTERISTIC_UUID,
    SERVICES,
};
use crate::domain::rotation::RotationThrottle;
use crate::domain::settings::Settings;
use crate::infrastructure::bluetooth::transport::GattTransport;
use std::collections::{HashMap, HashSet};
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum AdvertisingState {
    #[default]
    Stopped,
    /// Requested, waiting for the platform to confirm
    Starting,
    Active,
}

#[derive(Debug, Default)]
struct PeripheralState {
    powered_on: bool,
    advertising: AdvertisingState,
    connected_peer: Option<PeerId>,
    connecting_peer: Option<PeerId>,
    subscribed_characteristics: HashMap<Uuid, &'static CharacteristicDescriptor>,
    registered_services: HashSet<Uuid>,
    original_device_name: Option<String>,
}

pub struct Peripheral<T: GattTransport> {
    transport: T,
    event_sender: mpsc::UnboundedSender<NuimoEvent>,
    device_name: String,
    enabled: bool,
    state: PeripheralState,
    rotation: RotationThrottle,
}

impl<T: GattTransport> Peripheral<T> {
    pub fn new(
        transport: T,
        event_sender: mpsc::UnboundedSender<NuimoEvent>,
        settings: &Settings,
    ) -> Self {
        Self {
            transport,
            event_sender,
            device_name: settings.device_name.clone(),
            enabled: false,
            state: PeripheralState::default(),
            rotation: RotationThrottle::new(settings.max_rotation_events_per_sec),
        }
    }

    /*
     * Queries
     */

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn is_on(&self) -> bool {
        self.state.powered_on
    }

    pub fn is_advertising(&self) -> bool {
        self.state.advertising == AdvertisingState::Active
    }

    pub fn connected_peer(&self) -> Option<&PeerId> {
        self.state.connected_peer.as_ref()
    }

    pub fn radio_supported(&self) -> bool {
        self.transport.is_radio_available()
    }

    pub fn is_subscribed(&self, characteristic: Uuid) -> bool {
        self.state
            .subscribed_characteristics
            .contains_key(&characteristic)
    }

    pub fn subscription_count(&self) -> usize {
        self.state.subscribed_characteristics.len()
    }

    pub fn phase(&self) -> PeripheralPhase {
        if !self.state.powered_on {
            PeripheralPhase::Off
        } else if self.state.connected_peer.is_some() {
            PeripheralPhase::Connected
        } else if self.state.connecting_peer.is_some() {
            PeripheralPhase::Connecting
        } else if self.is_advertising() {
            PeripheralPhase::Advertising
        } else if !self.all_services_registered() {
            PeripheralPhase::RegisteringServices
        } else {
            PeripheralPhase::Idle
        }
    }

    pub fn status(&self) -> PeripheralStatus {
        PeripheralStatus {
            is_on: self.is_on(),
            is_advertising: self.is_advertising(),
            connected_peer: self.state.connected_peer.clone(),
            radio_supported: self.radio_supported(),
            phase: self.phase(),
        }
    }

    /*
     * Power
     */

    /// Turn the emulator on or off. Power follows both this flag and the
    /// radio state.
    pub fn set_enabled(&mut self, enabled: bool) {
        if self.enabled == enabled {
            return;
        }
        self.enabled = enabled;
        let radio_state = self.transport.radio_state();
        self.update_on_off_state(radio_state);
    }

    fn update_on_off_state(&mut self, radio_state: RadioState) {
        if self.enabled && radio_state == RadioState::On {
            self.power_on();
        } else if !self.enabled || matches!(radio_state, RadioState::TurningOff | RadioState::Off) {
            if self.enabled && !self.transport.is_radio_available() {
                warn!("No Bluetooth adapter available, emulator stays off");
            }
            self.power_off();
        }
    }

    fn power_on(&mut self) {
        if self.state.powered_on || !self.transport.is_radio_available() {
            return;
        }

        info!("Powering on as \"{}\"", self.device_name);
        self.state.original_device_name = self.transport.device_name();
        self.transport.set_device_name(Some(&self.device_name));

        if let Err(e) = self.transport.acquire_advertiser() {
            self.abort_power_on(e, false);
            return;
        }
        if let Err(e) = self.transport.open_server() {
            self.abort_power_on(e, true);
            return;
        }

        self.state.powered_on = true;

        for service in SERVICES.iter() {
            if let Err(e) = self.transport.add_service(service) {
                warn!("Failed to register service {}: {}", service.uuid, e);
            }
        }

        self.emit(NuimoEvent::PowerOn);
    }

    fn abort_power_on(&mut self, error: TransportError, advertiser_acquired: bool) {
        warn!("Cannot power on: {}", error);
        if advertiser_acquired {
            self.transport.release_advertiser();
        }
        self.restore_device_name();
        self.emit(NuimoEvent::StartAdvertisingFailure(
            AdvertiseFailure::FeatureUnsupported,
        ));
    }

    fn power_off(&mut self) {
        if !self.state.powered_on {
            return;
        }

        info!("Powering off");
        self.stop_advertising();
        self.state.powered_on = false;
        self.state.registered_services.clear();
        self.state.connecting_peer = None;
        self.rotation.reset();
        self.state.subscribed_characteristics.clear();
        if let Some(peer) = self.state.connected_peer.take() {
            self.disconnect(&peer);
        }
        self.transport.clear_services();
        self.transport.close_server();
        self.transport.release_advertiser();
        self.restore_device_name();
        self.emit(NuimoEvent::PowerOff);
    }

    fn restore_device_name(&mut self) {
        let name = self.state.original_device_name.take();
        self.transport.set_device_name(name.as_deref());
    }

    fn disconnect(&mut self, peer: &PeerId) {
        self.transport.cancel_connection(peer);
        self.state.subscribed_characteristics.clear();
        info!("Disconnected from {}", peer);
        self.emit(NuimoEvent::Disconnect(peer.clone()));
    }

    /*
     * User input
     */

    pub fn press_button(&mut self) -> bool {
        self.notify_characteristic_changed(
            SENSOR_BUTTON_CHARACTERISTIC_UUID,
            1,
            NotificationFormat::Uint8,
        )
    }

    pub fn release_button(&mut self) -> bool {
        self.notify_characteristic_changed(
            SENSOR_BUTTON_CHARACTERISTIC_UUID,
            0,
            NotificationFormat::Uint8,
        )
    }

    pub fn swipe(&mut self, direction: SwipeDirection) -> bool {
        self.notify_characteristic_changed(
            SENSOR_TOUCH_CHARACTERISTIC_UUID,
            direction.gatt_value() as i32,
            NotificationFormat::Uint8,
        )
    }

    /// Rotate by `delta` full turns
    pub fn rotate(&mut self, delta: f32) -> bool {
        self.rotate_at(delta, Instant::now())
    }

    pub fn rotate_at(&mut self, delta: f32, now: Instant) -> bool {
        if !self.state.powered_on {
            return false;
        }
        let Some(value) = self.rotation.accumulate(delta, now) else {
            return false;
        };
        if self.notify_characteristic_changed(
            SENSOR_ROTATION_CHARACTERISTIC_UUID,
            value as i32,
            NotificationFormat::Sint16,
        ) {
            self.rotation.commit(now);
            true
        } else {
            false
        }
    }

    fn notify_characteristic_changed(
        &mut self,
        characteristic: Uuid,
        value: i32,
        format: NotificationFormat,
    ) -> bool {
        if !self.state.powered_on {
            trace!("Ignoring input while powered off");
            return false;
        }
        let Some(peer) = &self.state.connected_peer else {
            trace!("Ignoring input, no peer connected");
            return false;
        };
        if !self
            .state
            .subscribed_characteristics
            .contains_key(&characteristic)
        {
            trace!("Ignoring input, {} not subscribed", characteristic);
            return false;
        }

        let bytes = codec::encode_notification_value(value, format);
        match self.transport.notify(peer, characteristic, &bytes) {
            Ok(()) => true,
            Err(e) => {
                debug!("Notification on {} failed: {}", characteristic, e);
                false
            }
        }
    }

    /*
     * Advertising
     */

    fn all_services_registered(&self) -> bool {
        self.state.registered_services.len() == SERVICES.len()
    }

    fn start_advertising(&mut self) {
        if !self.state.powered_on
            || self.state.advertising != AdvertisingState::Stopped
            || self.state.connected_peer.is_some()
            || !self.all_services_registered()
        {
            return;
        }
        self.state.advertising = AdvertisingState::Starting;

        info!("Start advertising");

        let request = AdvertiseRequest {
            include_device_name: true,
            service_uuids: vec![SENSOR_SERVICE_UUID],
            connectable: true,
            timeout_ms: 0,
            mode: AdvertiseMode::Balanced,
            tx_power: TxPowerLevel::Medium,
        };

        if let Err(e) = self.transport.start_advertising(&request) {
            warn!("Cannot advertise: {}", e);
            self.state.advertising = AdvertisingState::Stopped;
            let reason = match e {
                TransportError::Unsupported => AdvertiseFailure::FeatureUnsupported,
                _ => AdvertiseFailure::InternalError,
            };
            self.emit(NuimoEvent::StartAdvertisingFailure(reason));
        }
    }

    fn stop_advertising(&mut self) {
        if self.state.advertising == AdvertisingState::Stopped {
            return;
        }
        self.state.advertising = AdvertisingState::Stopped;

        info!("Stop advertising");

        // The platform may already consider advertising stopped
        if let Err(e) = self.transport.stop_advertising() {
            debug!("Ignoring stop advertising failure: {}", e);
        }
        self.emit(NuimoEvent::StopAdvertising);
    }

    /*
     * Transport events
     */

    /// Single transition function for everything the transport reports
    pub fn handle_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::RadioStateChanged(state) => {
                info!("Radio state changed: {:?}", state);
                self.update_on_off_state(state);
            }
            TransportEvent::ServiceAdded { service, status } => {
                self.on_service_added(service, status)
            }
            TransportEvent::AdvertiseStarted => self.on_advertise_started(),
            TransportEvent::AdvertiseFailed(reason) => self.on_advertise_failed(reason),
            TransportEvent::ConnectionStateChanged {
                peer,
                status,
                state,
            } => self.on_connection_state_changed(peer, status, state),
            TransportEvent::NotificationSent { peer, status } => {
                trace!("Notification sent to {}: {:?}", peer, status);
            }
            TransportEvent::MtuChanged { peer, mtu } => {
                info!("MTU for {} changed to {}", peer, mtu);
            }
            request if !self.state.powered_on => {
                debug!("Dropping request while powered off: {:?}", request);
            }
            TransportEvent::CharacteristicReadRequest {
                peer,
                request_id,
                characteristic,
                ..
            } => self.on_characteristic_read(&peer, request_id, characteristic),
            TransportEvent::CharacteristicWriteRequest {
                peer,
                request_id,
                characteristic,
                response_needed,
                offset,
                value,
                ..
            } => self.on_characteristic_write(
                &peer,
                request_id,
                characteristic,
                response_needed,
                offset,
                value,
            ),
            TransportEvent::DescriptorReadRequest {
                peer,
                request_id,
                characteristic,
                descriptor,
                ..
            } => self.on_descriptor_read(&peer, request_id, characteristic, descriptor),
            TransportEvent::DescriptorWriteRequest {
                peer,
                request_id,
                characteristic,
                descriptor,
                value,
                ..
            } => self.on_descriptor_write(&peer, request_id, characteristic, descriptor, value),
            TransportEvent::ExecuteWrite {
                peer,
                request_id,
                execute,
            } => {
                debug!("Execute write {} from {} (execute={})", request_id, peer, execute);
                self.respond(&peer, request_id, GattStatus::RequestNotSupported, &[]);
            }
        }
    }

    fn on_service_added(&mut self, service: Uuid, status: GattStatus) {
        if !self.state.powered_on {
            debug!("Ignoring registration of {} while powered off", service);
            return;
        }
        if profile::service(service).is_none() {
            warn!("Ignoring registration of unknown service {}", service);
            return;
        }
        if !status.is_success() {
            warn!("Service {} registered with status {:?}", service, status);
        }

        self.state.registered_services.insert(service);
        info!(
            "Service {} added, count={}",
            service,
            self.state.registered_services.len()
        );
        if self.all_services_registered() {
            self.start_advertising();
        }
    }

    fn on_advertise_started(&mut self) {
        if self.state.advertising != AdvertisingState::Starting {
            debug!("Ignoring stale advertising confirmation");
            return;
        }
        self.state.advertising = AdvertisingState::Active;
        info!("Advertising started");
        self.emit(NuimoEvent::StartAdvertising);
    }

    fn on_advertise_failed(&mut self, reason: AdvertiseFailure) {
        if self.state.advertising != AdvertisingState::Starting {
            debug!("Ignoring stale advertising failure {:?}", reason);
            return;
        }
        self.state.advertising = AdvertisingState::Stopped;
        warn!("Cannot advertise, error: {}", reason.code());
        self.emit(NuimoEvent::StartAdvertisingFailure(reason));
    }

    fn on_connection_state_changed(
        &mut self,
        peer: PeerId,
        status: GattStatus,
        state: ConnectionState,
    ) {
        info!(
            "Connection state changed for {}: {:?} (status {:?})",
            peer, state, status
        );

        // Only one connection at a time
        if let Some(current) = &self.state.connected_peer {
            if *current != peer {
                warn!("Rejecting {}, already connected to {}", peer, current);
                self.transport.cancel_connection(&peer);
                return;
            }
        }

        if !self.state.powered_on {
            if matches!(state, ConnectionState::Connecting | ConnectionState::Connected) {
                debug!("Rejecting {} while powered off", peer);
                self.transport.cancel_connection(&peer);
            }
            return;
        }

        let previous = self.state.connected_peer.clone();
        let connecting = status.is_success() && state == ConnectionState::Connecting;

        // Advertising stays stopped until this peer connects or gives up
        if connecting {
            self.state.connecting_peer = Some(peer.clone());
        } else if self.state.connecting_peer.as_ref() == Some(&peer)
            || (status.is_success() && state == ConnectionState::Connected)
        {
            self.state.connecting_peer = None;
        }

        if !status.is_success() {
            self.state.connected_peer = None;
        } else {
            match state {
                ConnectionState::Connecting => self.stop_advertising(),
                ConnectionState::Connected => self.state.connected_peer = Some(peer),
                ConnectionState::Disconnecting | ConnectionState::Disconnected => {
                    self.state.connected_peer = None
                }
            }
        }

        match (previous, self.state.connected_peer.clone()) {
            (None, Some(connected)) => {
                self.stop_advertising();
                info!("Connected to {}", connected);
                self.emit(NuimoEvent::Connect(connected));
            }
            (Some(previous), None) => {
                self.disconnect(&previous);
                self.start_advertising();
            }
            (None, None) if !connecting => self.start_advertising(),
            _ => {}
        }
    }

    fn on_characteristic_read(&mut self, peer: &PeerId, request_id: i32, characteristic: Uuid) {
        debug!("Read request {} for {}", request_id, characteristic);
        if characteristic == BATTERY_CHARACTERISTIC_UUID {
            let percent = codec::battery_percent(self.transport.battery_status());
            self.respond(peer, request_id, GattStatus::Success, &[percent]);
        } else {
            self.respond(peer, request_id, GattStatus::ReadNotPermitted, &[]);
        }
    }

    fn on_characteristic_write(
        &mut self,
        peer: &PeerId,
        request_id: i32,
        characteristic: Uuid,
        response_needed: bool,
        offset: u16,
        value: Option<Vec<u8>>,
    ) {
        debug!(
            "Write request {} for {}, response_needed={}",
            request_id, characteristic, response_needed
        );
        if characteristic != LED_MATRIX_CHARACTERISTIC_UUID {
            self.respond(peer, request_id, GattStatus::WriteNotPermitted, &[]);
            return;
        }

        let decoded = if !response_needed {
            Err(GattStatus::RequestNotSupported)
        } else {
            match value {
                Some(payload) => {
                    codec::decode_led_matrix_write(&payload, offset).map_err(GattStatus::from)
                }
                None => Err(GattStatus::InvalidAttributeLength),
            }
        };

        match decoded {
            Ok(command) => {
                self.respond(peer, request_id, GattStatus::Success, &[]);
                debug!("LED matrix received, {} cells lit", command.lit_count());
                self.emit(NuimoEvent::ReceiveLedMatrix(command));
            }
            Err(status) => {
                debug!("Rejecting LED matrix write: {:?}", status);
                self.respond(peer, request_id, status, &[]);
            }
        }
    }

    fn on_descriptor_read(
        &mut self,
        peer: &PeerId,
        request_id: i32,
        characteristic: Uuid,
        descriptor: Uuid,
    ) {
        debug!("Descriptor read request {} for {}", request_id, characteristic);
        let notifies = profile::characteristic(characteristic)
            .is_some_and(|c| c.has_property(Property::Notify));

        if notifies && descriptor == CHARACTERISTIC_NOTIFICATION_DESCRIPTOR_UUID {
            let value = if self.is_subscribed(characteristic) {
                ENABLE_NOTIFICATION_VALUE
            } else {
                DISABLE_NOTIFICATION_VALUE
            };
            self.respond(peer, request_id, GattStatus::Success, &value);
        } else {
            self.respond(peer, request_id, GattStatus::ReadNotPermitted, &[]);
        }
    }

    fn on_descriptor_write(
        &mut self,
        peer: &PeerId,
        request_id: i32,
        characteristic: Uuid,
        descriptor: Uuid,
        value: Option<Vec<u8>>,
    ) {
        debug!("Descriptor write request {} for {}", request_id, characteristic);
        let target = profile::characteristic(characteristic)
            .filter(|c| c.has_property(Property::Notify));

        let status = match target {
            None => GattStatus::WriteNotPermitted,
            Some(_) if descriptor != CHARACTERISTIC_NOTIFICATION_DESCRIPTOR_UUID => {
                GattStatus::WriteNotPermitted
            }
            Some(_) if self.state.connected_peer.as_ref() != Some(peer) => {
                GattStatus::WriteNotPermitted
            }
            Some(target) => match value.as_deref() {
                Some(v) if v == &ENABLE_NOTIFICATION_VALUE[..] => {
                    info!("{} subscribed to {}", peer, characteristic);
                    self.state
                        .subscribed_characteristics
                        .insert(characteristic, target);
                    GattStatus::Success
                }
                Some(v) if v == &DISABLE_NOTIFICATION_VALUE[..] => {
                    info!("{} unsubscribed from {}", peer, characteristic);
                    self.state.subscribed_characteristics.remove(&characteristic);
                    GattStatus::Success
                }
                _ => GattStatus::RequestNotSupported,
            },
        };

        self.respond(peer, request_id, status, &[]);
    }

    fn respond(&mut self, peer: &PeerId, request_id: i32, status: GattStatus, value: &[u8]) {
        if let Err(e) = self
            .transport
            .send_response(peer, request_id, status, 0, value)
        {
            warn!("Failed to respond to request {}: {}", request_id, e);
        }
    }

    fn emit(&self, event: NuimoEvent) {
        let _ = self.event_sender.send(event);
    }
}
