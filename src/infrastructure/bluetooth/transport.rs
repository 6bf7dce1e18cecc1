//! Platform Transport Capability
//!
//! Everything the state machine needs from the host BLE stack. All calls are
//! fire-and-forget requests; their outcomes come back later as
//! [`TransportEvent`](crate::domain::models::TransportEvent)s.

use crate::domain::error::TransportError;
use crate::domain::models::{AdvertiseRequest, BatteryStatus, GattStatus, PeerId, RadioState};
use crate::domain::profile::ServiceDescriptor;
use uuid::Uuid;

pub trait GattTransport: Send {
    /// Whether the host has a Bluetooth adapter at all
    fn is_radio_available(&self) -> bool;

    fn radio_state(&self) -> RadioState;

    fn device_name(&self) -> Option<String>;

    fn set_device_name(&mut self, name: Option<&str>);

    /// Acquire the LE advertiser. Fails when peripheral mode is unsupported.
    fn acquire_advertiser(&mut self) -> Result<(), TransportError>;

    fn release_advertiser(&mut self);

    fn open_server(&mut self) -> Result<(), TransportError>;

    fn close_server(&mut self);

    /// Register a service. Acknowledged by `TransportEvent::ServiceAdded`.
    fn add_service(&mut self, service: &'static ServiceDescriptor) -> Result<(), TransportError>;

    fn clear_services(&mut self);

    /// Acknowledged by `AdvertiseStarted` or `AdvertiseFailed`
    fn start_advertising(&mut self, request: &AdvertiseRequest) -> Result<(), TransportError>;

    fn stop_advertising(&mut self) -> Result<(), TransportError>;

    fn send_response(
        &mut self,
        peer: &PeerId,
        request_id: i32,
        status: GattStatus,
        offset: u16,
        value: &[u8],
    ) -> Result<(), TransportError>;

    /// Send an unacknowledged notification
    fn notify(
        &mut self,
        peer: &PeerId,
        characteristic: Uuid,
        value: &[u8],
    ) -> Result<(), TransportError>;

    fn cancel_connection(&mut self, peer: &PeerId);

    /// Host battery, if the platform reports one
    fn battery_status(&self) -> Option<BatteryStatus>;
}
