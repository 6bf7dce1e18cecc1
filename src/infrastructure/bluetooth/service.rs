//! Emulator Service Module
//!
//! Runs a [`Peripheral`] on its own task so that user input and transport
//! callbacks, which arrive from different threads, are applied one at a time.

use crate::domain::error::EmulatorError;
use crate::domain::models::{NuimoEvent, PeripheralStatus, SwipeDirection, TransportEvent};
use crate::domain::settings::Settings;
use crate::infrastructure::bluetooth::peripheral::Peripheral;
use crate::infrastructure::bluetooth::transport::GattTransport;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};

/// Requests from the collaborator to the emulator task
#[derive(Debug)]
pub enum EmulatorCommand {
    SetEnabled(bool),
    PressButton,
    ReleaseButton,
    Swipe(SwipeDirection),
    Rotate(f32),
    /// A peer-side or platform event injected by the collaborator
    Transport(TransportEvent),
    Status(oneshot::Sender<PeripheralStatus>),
    Shutdown,
}

/// Channel the platform layer uses to acknowledge its own requests
pub fn transport_channel() -> (
    mpsc::UnboundedSender<TransportEvent>,
    mpsc::UnboundedReceiver<TransportEvent>,
) {
    mpsc::unbounded_channel()
}

/// Cloneable front end to a running emulator
#[derive(Debug, Clone)]
pub struct EmulatorHandle {
    commands: mpsc::UnboundedSender<EmulatorCommand>,
}

impl EmulatorHandle {
    fn send(&self, command: EmulatorCommand) -> Result<(), EmulatorError> {
        self.commands
            .send(command)
            .map_err(|_| EmulatorError::ServiceClosed)
    }

    pub fn set_enabled(&self, enabled: bool) -> Result<(), EmulatorError> {
        self.send(EmulatorCommand::SetEnabled(enabled))
    }

    pub fn press_button(&self) -> Result<(), EmulatorError> {
        self.send(EmulatorCommand::PressButton)
    }

    pub fn release_button(&self) -> Result<(), EmulatorError> {
        self.send(EmulatorCommand::ReleaseButton)
    }

    pub fn swipe(&self, direction: SwipeDirection) -> Result<(), EmulatorError> {
        self.send(EmulatorCommand::Swipe(direction))
    }

    /// Rotate by `delta` full turns
    pub fn rotate(&self, delta: f32) -> Result<(), EmulatorError> {
        self.send(EmulatorCommand::Rotate(delta))
    }

    /// Feed a platform callback into the emulator, in order with the other
    /// calls made on this handle
    pub fn transport_event(&self, event: TransportEvent) -> Result<(), EmulatorError> {
        self.send(EmulatorCommand::Transport(event))
    }

    /// Snapshot of the peripheral, taken after all previously sent commands
    /// and queued transport events have been applied
    pub async fn status(&self) -> Result<PeripheralStatus, EmulatorError> {
        let (tx, rx) = oneshot::channel();
        self.send(EmulatorCommand::Status(tx))?;
        rx.await.map_err(|_| EmulatorError::ServiceClosed)
    }

    /// Power off and stop the emulator task
    pub fn shutdown(&self) -> Result<(), EmulatorError> {
        self.send(EmulatorCommand::Shutdown)
    }
}

pub struct EmulatorService<T: GattTransport> {
    peripheral: Peripheral<T>,
    command_rx: mpsc::UnboundedReceiver<EmulatorCommand>,
    transport_rx: mpsc::UnboundedReceiver<TransportEvent>,
}

impl<T: GattTransport + 'static> EmulatorService<T> {
    /// Start the emulator on the current tokio runtime.
    ///
    /// `transport_rx` receives the transport's acknowledgements (see
    /// [`transport_channel`]). They are applied ahead of queued commands.
    pub fn spawn(
        transport: T,
        settings: &Settings,
        transport_rx: mpsc::UnboundedReceiver<TransportEvent>,
    ) -> (EmulatorHandle, mpsc::UnboundedReceiver<NuimoEvent>) {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (command_tx, command_rx) = mpsc::unbounded_channel();

        let service = Self {
            peripheral: Peripheral::new(transport, event_tx, settings),
            command_rx,
            transport_rx,
        };
        tokio::spawn(service.run());

        let handle = EmulatorHandle {
            commands: command_tx,
        };
        (handle, event_rx)
    }

    async fn run(mut self) {
        info!("Emulator service started");

        loop {
            tokio::select! {
                // Transport events first, so acknowledgements queued while
                // handling a command are applied before the next command
                biased;

                Some(event) = self.transport_rx.recv() => {
                    self.peripheral.handle_event(event);
                }
                command = self.command_rx.recv() => match command {
                    Some(EmulatorCommand::Shutdown) | None => break,
                    Some(command) => self.handle_command(command),
                },
            }
        }

        self.peripheral.set_enabled(false);
        info!("Emulator service stopped");
    }

    fn handle_command(&mut self, command: EmulatorCommand) {
        let delivered = match command {
            EmulatorCommand::SetEnabled(enabled) => {
                self.peripheral.set_enabled(enabled);
                return;
            }
            EmulatorCommand::Transport(event) => {
                self.peripheral.handle_event(event);
                return;
            }
            EmulatorCommand::Status(reply) => {
                let _ = reply.send(self.peripheral.status());
                return;
            }
            EmulatorCommand::PressButton => self.peripheral.press_button(),
            EmulatorCommand::ReleaseButton => self.peripheral.release_button(),
            EmulatorCommand::Swipe(direction) => self.peripheral.swipe(direction),
            EmulatorCommand::Rotate(delta) => self.peripheral.rotate(delta),
            EmulatorCommand::Shutdown => return,
        };

        if !delivered {
            debug!("Input not delivered");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{ConnectionState, GattStatus, PeerId, PeripheralPhase};
    use crate::domain::profile::{
        CHARACTERISTIC_NOTIFICATION_DESCRIPTOR_UUID, ENABLE_NOTIFICATION_VALUE,
        SENSOR_BUTTON_CHARACTERISTIC_UUID,
    };
    use crate::infrastructure::bluetooth::simulated::{RadioMonitor, SimulatedRadio, TransportCall};

    fn start() -> (
        EmulatorHandle,
        mpsc::UnboundedReceiver<NuimoEvent>,
        RadioMonitor,
    ) {
        let (transport_tx, transport_rx) = transport_channel();
        let radio = SimulatedRadio::new().with_loopback(transport_tx);
        let monitor = radio.monitor();
        let (handle, events) = EmulatorService::spawn(radio, &Settings::default(), transport_rx);
        (handle, events, monitor)
    }

    #[tokio::test]
    async fn test_enable_starts_advertising() {
        let (handle, mut events, _monitor) = start();
        handle.set_enabled(true).unwrap();

        let status = handle.status().await.unwrap();
        assert!(status.is_on);
        assert!(status.is_advertising);
        assert_eq!(status.phase, PeripheralPhase::Advertising);

        assert_eq!(events.recv().await, Some(NuimoEvent::PowerOn));
        assert_eq!(events.recv().await, Some(NuimoEvent::StartAdvertising));
    }

    #[tokio::test]
    async fn test_button_press_reaches_subscribed_peer() {
        let (handle, _events, monitor) = start();
        handle.set_enabled(true).unwrap();

        let peer = PeerId::new("central");
        handle
            .transport_event(TransportEvent::ConnectionStateChanged {
                peer: peer.clone(),
                status: GattStatus::Success,
                state: ConnectionState::Connected,
            })
            .unwrap();
        handle
            .transport_event(TransportEvent::DescriptorWriteRequest {
                peer: peer.clone(),
                request_id: 1,
                characteristic: SENSOR_BUTTON_CHARACTERISTIC_UUID,
                descriptor: CHARACTERISTIC_NOTIFICATION_DESCRIPTOR_UUID,
                prepared_write: false,
                response_needed: true,
                offset: 0,
                value: Some(ENABLE_NOTIFICATION_VALUE.to_vec()),
            })
            .unwrap();
        handle.press_button().unwrap();

        let status = handle.status().await.unwrap();
        assert_eq!(status.connected_peer, Some(peer));
        assert!(!status.is_advertising);
        assert_eq!(
            monitor.notifications(),
            vec![(SENSOR_BUTTON_CHARACTERISTIC_UUID, vec![0x01])]
        );
    }

    #[tokio::test]
    async fn test_peer_events_follow_power_on() {
        let (handle, mut events, monitor) = start();
        let peer = PeerId::new("central");

        handle.set_enabled(true).unwrap();
        handle
            .transport_event(TransportEvent::ConnectionStateChanged {
                peer: peer.clone(),
                status: GattStatus::Success,
                state: ConnectionState::Connected,
            })
            .unwrap();

        let status = handle.status().await.unwrap();
        assert_eq!(status.connected_peer, Some(peer.clone()));
        assert_eq!(status.phase, PeripheralPhase::Connected);
        assert!(!monitor
            .calls()
            .iter()
            .any(|c| matches!(c, TransportCall::CancelConnection(_))));

        let mut received = Vec::new();
        while let Ok(event) = events.try_recv() {
            received.push(event);
        }
        assert_eq!(
            received,
            vec![
                NuimoEvent::PowerOn,
                NuimoEvent::StartAdvertising,
                NuimoEvent::StopAdvertising,
                NuimoEvent::Connect(peer),
            ]
        );
    }

    #[tokio::test]
    async fn test_shutdown_powers_off() {
        let (handle, mut events, monitor) = start();
        handle.set_enabled(true).unwrap();
        handle.status().await.unwrap();
        assert_eq!(monitor.device_name().as_deref(), Some("Nuimo"));

        handle.shutdown().unwrap();

        let mut received = Vec::new();
        while let Some(event) = events.recv().await {
            received.push(event);
        }
        assert_eq!(received.last(), Some(&NuimoEvent::PowerOff));
        assert_eq!(monitor.device_name().as_deref(), Some("host"));
        assert!(matches!(
            handle.status().await,
            Err(EmulatorError::ServiceClosed)
        ));
    }
}
