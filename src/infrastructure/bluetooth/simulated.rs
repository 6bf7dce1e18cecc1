//! Simulated Radio
//!
//! An in-process [`GattTransport`] that records every request instead of
//! talking to hardware. With a loopback sender attached it also acknowledges
//! service registration and advertising the way a real stack would.

use crate::domain::error::TransportError;
use crate::domain::models::{
    AdvertiseRequest, BatteryStatus, GattStatus, PeerId, RadioState, TransportEvent,
};
use crate::domain::profile::ServiceDescriptor;
use crate::infrastructure::bluetooth::transport::GattTransport;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc;
use tracing::trace;
use uuid::Uuid;

/// A request the state machine made of the transport
#[derive(Debug, Clone, PartialEq)]
pub enum TransportCall {
    SetDeviceName(Option<String>),
    AcquireAdvertiser,
    ReleaseAdvertiser,
    OpenServer,
    CloseServer,
    /// Service UUID plus the characteristics that received a CCCD
    AddService {
        service: Uuid,
        notify_descriptors: Vec<Uuid>,
    },
    ClearServices,
    StartAdvertising(AdvertiseRequest),
    StopAdvertising,
    SendResponse {
        peer: PeerId,
        request_id: i32,
        status: GattStatus,
        value: Vec<u8>,
    },
    Notify {
        peer: PeerId,
        characteristic: Uuid,
        value: Vec<u8>,
    },
    CancelConnection(PeerId),
}

#[derive(Debug)]
struct RadioInner {
    radio_available: bool,
    advertiser_supported: bool,
    server_available: bool,
    radio_state: RadioState,
    device_name: Option<String>,
    battery: Option<BatteryStatus>,
    fail_notifications: bool,
    fail_stop_advertising: bool,
    calls: Vec<TransportCall>,
}

/// Shared view of a [`SimulatedRadio`], usable after the radio is moved
/// into the emulator
#[derive(Debug, Clone)]
pub struct RadioMonitor {
    inner: Arc<Mutex<RadioInner>>,
}

impl RadioMonitor {
    fn lock(&self) -> MutexGuard<'_, RadioInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn calls(&self) -> Vec<TransportCall> {
        self.lock().calls.clone()
    }

    pub fn take_calls(&self) -> Vec<TransportCall> {
        std::mem::take(&mut self.lock().calls)
    }

    /// Notifications sent so far, as (characteristic, value)
    pub fn notifications(&self) -> Vec<(Uuid, Vec<u8>)> {
        self.lock()
            .calls
            .iter()
            .filter_map(|c| match c {
                TransportCall::Notify {
                    characteristic,
                    value,
                    ..
                } => Some((*characteristic, value.clone())),
                _ => None,
            })
            .collect()
    }

    /// Responses sent so far, as (request id, status, value)
    pub fn responses(&self) -> Vec<(i32, GattStatus, Vec<u8>)> {
        self.lock()
            .calls
            .iter()
            .filter_map(|c| match c {
                TransportCall::SendResponse {
                    request_id,
                    status,
                    value,
                    ..
                } => Some((*request_id, *status, value.clone())),
                _ => None,
            })
            .collect()
    }

    pub fn device_name(&self) -> Option<String> {
        self.lock().device_name.clone()
    }

    pub fn set_radio_state(&self, state: RadioState) {
        self.lock().radio_state = state;
    }

    pub fn set_battery(&self, battery: Option<BatteryStatus>) {
        self.lock().battery = battery;
    }

    pub fn set_fail_notifications(&self, fail: bool) {
        self.lock().fail_notifications = fail;
    }

    pub fn set_fail_stop_advertising(&self, fail: bool) {
        self.lock().fail_stop_advertising = fail;
    }
}

pub struct SimulatedRadio {
    monitor: RadioMonitor,
    loopback: Option<mpsc::UnboundedSender<TransportEvent>>,
}

impl SimulatedRadio {
    /// A powered-on radio that supports peripheral mode
    pub fn new() -> Self {
        Self {
            monitor: RadioMonitor {
                inner: Arc::new(Mutex::new(RadioInner {
                    radio_available: true,
                    advertiser_supported: true,
                    server_available: true,
                    radio_state: RadioState::On,
                    device_name: Some("host".to_string()),
                    battery: Some(BatteryStatus {
                        level: 80,
                        scale: 100,
                    }),
                    fail_notifications: false,
                    fail_stop_advertising: false,
                    calls: Vec::new(),
                })),
            },
            loopback: None,
        }
    }

    /// A host without any Bluetooth adapter
    pub fn without_radio() -> Self {
        let radio = Self::new();
        {
            let mut inner = radio.monitor.lock();
            inner.radio_available = false;
            inner.radio_state = RadioState::Off;
        }
        radio
    }

    /// A radio that cannot act as a peripheral
    pub fn without_advertiser() -> Self {
        let radio = Self::new();
        radio.monitor.lock().advertiser_supported = false;
        radio
    }

    /// A radio whose GATT server cannot be opened
    pub fn without_server() -> Self {
        let radio = Self::new();
        radio.monitor.lock().server_available = false;
        radio
    }

    /// Acknowledge registrations and advertising through `sender`
    pub fn with_loopback(mut self, sender: mpsc::UnboundedSender<TransportEvent>) -> Self {
        self.loopback = Some(sender);
        self
    }

    pub fn monitor(&self) -> RadioMonitor {
        self.monitor.clone()
    }

    fn record(&self, call: TransportCall) {
        trace!("Simulated radio: {:?}", call);
        self.monitor.lock().calls.push(call);
    }

    fn loop_back(&self, event: TransportEvent) {
        if let Some(sender) = &self.loopback {
            let _ = sender.send(event);
        }
    }
}

impl Default for SimulatedRadio {
    fn default() -> Self {
        Self::new()
    }
}

impl GattTransport for SimulatedRadio {
    fn is_radio_available(&self) -> bool {
        self.monitor.lock().radio_available
    }

    fn radio_state(&self) -> RadioState {
        self.monitor.lock().radio_state
    }

    fn device_name(&self) -> Option<String> {
        self.monitor.lock().device_name.clone()
    }

    fn set_device_name(&mut self, name: Option<&str>) {
        self.monitor.lock().device_name = name.map(str::to_string);
        self.record(TransportCall::SetDeviceName(name.map(str::to_string)));
    }

    fn acquire_advertiser(&mut self) -> Result<(), TransportError> {
        if !self.monitor.lock().advertiser_supported {
            return Err(TransportError::Unsupported);
        }
        self.record(TransportCall::AcquireAdvertiser);
        Ok(())
    }

    fn release_advertiser(&mut self) {
        self.record(TransportCall::ReleaseAdvertiser);
    }

    fn open_server(&mut self) -> Result<(), TransportError> {
        if !self.monitor.lock().server_available {
            return Err(TransportError::Unavailable("GATT server".to_string()));
        }
        self.record(TransportCall::OpenServer);
        Ok(())
    }

    fn close_server(&mut self) {
        self.record(TransportCall::CloseServer);
    }

    fn add_service(&mut self, service: &'static ServiceDescriptor) -> Result<(), TransportError> {
        let notify_descriptors = service
            .characteristics
            .iter()
            .filter(|c| c.has_notification_descriptor())
            .map(|c| c.uuid)
            .collect();
        self.record(TransportCall::AddService {
            service: service.uuid,
            notify_descriptors,
        });
        self.loop_back(TransportEvent::ServiceAdded {
            service: service.uuid,
            status: GattStatus::Success,
        });
        Ok(())
    }

    fn clear_services(&mut self) {
        self.record(TransportCall::ClearServices);
    }

    fn start_advertising(&mut self, request: &AdvertiseRequest) -> Result<(), TransportError> {
        self.record(TransportCall::StartAdvertising(request.clone()));
        self.loop_back(TransportEvent::AdvertiseStarted);
        Ok(())
    }

    fn stop_advertising(&mut self) -> Result<(), TransportError> {
        self.record(TransportCall::StopAdvertising);
        if self.monitor.lock().fail_stop_advertising {
            return Err(TransportError::Unavailable("radio is off".to_string()));
        }
        Ok(())
    }

    fn send_response(
        &mut self,
        peer: &PeerId,
        request_id: i32,
        status: GattStatus,
        _offset: u16,
        value: &[u8],
    ) -> Result<(), TransportError> {
        self.record(TransportCall::SendResponse {
            peer: peer.clone(),
            request_id,
            status,
            value: value.to_vec(),
        });
        Ok(())
    }

    fn notify(
        &mut self,
        peer: &PeerId,
        characteristic: Uuid,
        value: &[u8],
    ) -> Result<(), TransportError> {
        if self.monitor.lock().fail_notifications {
            return Err(TransportError::Rejected("notification queue full".to_string()));
        }
        self.record(TransportCall::Notify {
            peer: peer.clone(),
            characteristic,
            value: value.to_vec(),
        });
        Ok(())
    }

    fn cancel_connection(&mut self, peer: &PeerId) {
        self.record(TransportCall::CancelConnection(peer.clone()));
    }

    fn battery_status(&self) -> Option<BatteryStatus> {
        self.monitor.lock().battery
    }
}
