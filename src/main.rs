use anyhow::{anyhow, Result};
use nuimo_emulator::domain::codec::{LedMatrixCommand, LED_MATRIX_PAYLOAD_LEN};
use nuimo_emulator::domain::models::{
    ConnectionState, GattStatus, NuimoEvent, PeerId, SwipeDirection, TransportEvent,
};
use nuimo_emulator::domain::profile::{
    self, CharacteristicDescriptor, BATTERY_CHARACTERISTIC_UUID,
    CHARACTERISTIC_NOTIFICATION_DESCRIPTOR_UUID, DISABLE_NOTIFICATION_VALUE,
    ENABLE_NOTIFICATION_VALUE, LED_MATRIX_CHARACTERISTIC_UUID,
};
use nuimo_emulator::domain::settings::SettingsService;
use nuimo_emulator::infrastructure::bluetooth::simulated::{RadioMonitor, SimulatedRadio};
use nuimo_emulator::infrastructure::bluetooth::{transport_channel, EmulatorHandle, EmulatorService};
use nuimo_emulator::infrastructure::logging::init_logger;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

const HELP: &str = "\
Emulator:
  on | off                 enable or disable the emulator
  press | release          button
  swipe <left|right|up|down>
  rotate <turns>           e.g. rotate 0.25
  status
Peer side:
  connect <peer> | disconnect <peer>
  subscribe <characteristic> | unsubscribe <characteristic>
  read battery
  led <26 hex digits>      write an LED matrix command
help | quit";

/// One line of shell input
#[derive(Debug, PartialEq)]
enum ShellCommand {
    On,
    Off,
    Press,
    Release,
    Swipe(SwipeDirection),
    Rotate(f32),
    Status,
    Connect(PeerId),
    Disconnect(PeerId),
    Subscribe(&'static CharacteristicDescriptor),
    Unsubscribe(&'static CharacteristicDescriptor),
    ReadBattery,
    Led(Vec<u8>),
    Help,
    Quit,
}

fn parse_command(line: &str) -> Result<Option<ShellCommand>> {
    let mut words = line.split_whitespace();
    let Some(verb) = words.next() else {
        return Ok(None);
    };
    let arg = words.next();

    let command = match (verb.to_lowercase().as_str(), arg) {
        ("on", None) => ShellCommand::On,
        ("off", None) => ShellCommand::Off,
        ("press", None) => ShellCommand::Press,
        ("release", None) => ShellCommand::Release,
        ("swipe", Some(dir)) => ShellCommand::Swipe(
            SwipeDirection::parse(dir).ok_or_else(|| anyhow!("Unknown direction: {}", dir))?,
        ),
        ("rotate", Some(delta)) => ShellCommand::Rotate(delta.parse()?),
        ("status", None) => ShellCommand::Status,
        ("connect", Some(peer)) => ShellCommand::Connect(PeerId::new(peer)),
        ("disconnect", Some(peer)) => ShellCommand::Disconnect(PeerId::new(peer)),
        ("subscribe", Some(name)) => ShellCommand::Subscribe(parse_characteristic(name)?),
        ("unsubscribe", Some(name)) => ShellCommand::Unsubscribe(parse_characteristic(name)?),
        ("read", Some("battery")) => ShellCommand::ReadBattery,
        ("led", Some(hex)) => ShellCommand::Led(parse_hex(hex)?),
        ("help", None) | ("?", None) => ShellCommand::Help,
        ("quit", None) | ("exit", None) => ShellCommand::Quit,
        _ => return Err(anyhow!("Unknown command: {} (try \"help\")", line.trim())),
    };
    Ok(Some(command))
}

fn parse_characteristic(name: &str) -> Result<&'static CharacteristicDescriptor> {
    profile::characteristic_by_name(name).ok_or_else(|| anyhow!("Unknown characteristic: {}", name))
}

fn parse_hex(hex: &str) -> Result<Vec<u8>> {
    let hex = hex.replace([':', '-'], "");
    if hex.len() != LED_MATRIX_PAYLOAD_LEN * 2 || !hex.is_ascii() {
        return Err(anyhow!(
            "LED payload must be {} hex digits",
            LED_MATRIX_PAYLOAD_LEN * 2
        ));
    }

    (0..LED_MATRIX_PAYLOAD_LEN)
        .map(|i| u8::from_str_radix(&hex[i * 2..i * 2 + 2], 16).map_err(anyhow::Error::from))
        .collect()
}

/// Draw the matrix as 9 rows of 11 cells
fn render_matrix(command: &LedMatrixCommand) -> String {
    command
        .cells
        .chunks(11)
        .map(|row| row.iter().map(|&lit| if lit { '#' } else { '.' }).collect::<String>())
        .collect::<Vec<_>>()
        .join("\n")
}

struct Shell {
    handle: EmulatorHandle,
    monitor: RadioMonitor,
    peer: PeerId,
    next_request_id: i32,
}

impl Shell {
    fn new(handle: EmulatorHandle, monitor: RadioMonitor) -> Self {
        Self {
            handle,
            monitor,
            peer: PeerId::new("central"),
            next_request_id: 1,
        }
    }

    fn request_id(&mut self) -> i32 {
        let id = self.next_request_id;
        self.next_request_id += 1;
        id
    }

    fn write_cccd(&mut self, characteristic: &CharacteristicDescriptor, value: [u8; 2]) -> Result<()> {
        let request_id = self.request_id();
        self.handle.transport_event(TransportEvent::DescriptorWriteRequest {
            peer: self.peer.clone(),
            request_id,
            characteristic: characteristic.uuid,
            descriptor: CHARACTERISTIC_NOTIFICATION_DESCRIPTOR_UUID,
            prepared_write: false,
            response_needed: true,
            offset: 0,
            value: Some(value.to_vec()),
        })?;
        Ok(())
    }

    async fn execute(&mut self, command: ShellCommand) -> Result<()> {
        match command {
            ShellCommand::On => self.handle.set_enabled(true)?,
            ShellCommand::Off => self.handle.set_enabled(false)?,
            ShellCommand::Press => self.handle.press_button()?,
            ShellCommand::Release => self.handle.release_button()?,
            ShellCommand::Swipe(direction) => self.handle.swipe(direction)?,
            ShellCommand::Rotate(delta) => self.handle.rotate(delta)?,
            ShellCommand::Status => {
                let status = self.handle.status().await?;
                println!(
                    "phase={:?} on={} advertising={} peer={} radio={}",
                    status.phase,
                    status.is_on,
                    status.is_advertising,
                    status
                        .connected_peer
                        .map(|p| p.to_string())
                        .unwrap_or_else(|| "-".to_string()),
                    if status.radio_supported { "yes" } else { "no" },
                );
            }
            ShellCommand::Connect(peer) => {
                self.handle.transport_event(TransportEvent::ConnectionStateChanged {
                    peer: peer.clone(),
                    status: GattStatus::Success,
                    state: ConnectionState::Connected,
                })?;
                // Later peer-side commands come from this peer only if it was accepted
                let status = self.handle.status().await?;
                if status.connected_peer.as_ref() == Some(&peer) {
                    self.peer = peer;
                } else {
                    println!("{} was not accepted", peer);
                }
            }
            ShellCommand::Disconnect(peer) => {
                self.handle.transport_event(TransportEvent::ConnectionStateChanged {
                    peer,
                    status: GattStatus::Success,
                    state: ConnectionState::Disconnected,
                })?;
            }
            ShellCommand::Subscribe(characteristic) => {
                self.write_cccd(characteristic, ENABLE_NOTIFICATION_VALUE)?
            }
            ShellCommand::Unsubscribe(characteristic) => {
                self.write_cccd(characteristic, DISABLE_NOTIFICATION_VALUE)?
            }
            ShellCommand::ReadBattery => {
                let request_id = self.request_id();
                self.handle.transport_event(TransportEvent::CharacteristicReadRequest {
                    peer: self.peer.clone(),
                    request_id,
                    offset: 0,
                    characteristic: BATTERY_CHARACTERISTIC_UUID,
                })?;
            }
            ShellCommand::Led(payload) => {
                let request_id = self.request_id();
                self.handle.transport_event(TransportEvent::CharacteristicWriteRequest {
                    peer: self.peer.clone(),
                    request_id,
                    characteristic: LED_MATRIX_CHARACTERISTIC_UUID,
                    prepared_write: false,
                    response_needed: true,
                    offset: 0,
                    value: Some(payload),
                })?;
            }
            ShellCommand::Help => println!("{}", HELP),
            ShellCommand::Quit => {}
        }

        // Let the emulator catch up, then show what went over the air
        self.handle.status().await?;
        for call in self.monitor.take_calls() {
            println!("  radio: {:?}", call);
        }
        Ok(())
    }
}

fn log_event(event: &NuimoEvent) {
    match event {
        NuimoEvent::ReceiveLedMatrix(command) => info!(
            "LED matrix (brightness {:.2}, {:.1}s):\n{}",
            command.brightness,
            command.display_interval_secs,
            render_matrix(command)
        ),
        other => info!("Nuimo event: {:?}", other),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let settings_service = SettingsService::new()?;
    let settings = settings_service.get().clone();
    let _log_guard = init_logger(&settings.log_settings)?;

    // Leave a complete settings file behind for editing
    if let Err(e) = settings_service.save() {
        warn!("Failed to save settings: {}", e);
    }

    info!("Starting Nuimo emulator as \"{}\"", settings.device_name);

    let (transport_tx, transport_rx) = transport_channel();
    let radio = SimulatedRadio::new().with_loopback(transport_tx);
    let monitor = radio.monitor();
    let (handle, mut events) = EmulatorService::spawn(radio, &settings, transport_rx);

    let event_logger = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            log_event(&event);
        }
    });

    if settings.auto_enable {
        handle.set_enabled(true)?;
    }

    println!("{}", HELP);
    let mut shell = Shell::new(handle.clone(), monitor);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        match parse_command(&line) {
            Ok(Some(ShellCommand::Quit)) => break,
            Ok(Some(command)) => shell.execute(command).await?,
            Ok(None) => {}
            Err(e) => println!("{}", e),
        }
    }

    handle.shutdown()?;
    event_logger.await?;
    info!("Nuimo emulator exited");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use nuimo_emulator::domain::settings::Settings;

    #[test]
    fn test_parse_commands() {
        assert_eq!(parse_command("  ").unwrap(), None);
        assert_eq!(parse_command("ON").unwrap(), Some(ShellCommand::On));
        assert_eq!(
            parse_command("swipe up").unwrap(),
            Some(ShellCommand::Swipe(SwipeDirection::Up))
        );
        assert_eq!(
            parse_command("rotate -0.5").unwrap(),
            Some(ShellCommand::Rotate(-0.5))
        );
        assert_eq!(
            parse_command("connect phone").unwrap(),
            Some(ShellCommand::Connect(PeerId::new("phone")))
        );
        assert_eq!(
            parse_command("subscribe button").unwrap(),
            Some(ShellCommand::Subscribe(&profile::SENSOR_BUTTON))
        );
        assert_eq!(parse_command("read battery").unwrap(), Some(ShellCommand::ReadBattery));
    }

    #[test]
    fn test_parse_errors() {
        assert!(parse_command("swipe sideways").is_err());
        assert!(parse_command("rotate lots").is_err());
        assert!(parse_command("subscribe gyro").is_err());
        assert!(parse_command("dance").is_err());
        assert!(parse_command("on now").is_err());
    }

    #[test]
    fn test_parse_hex() {
        let payload = parse_hex("ff000000000000000000003314").unwrap();
        assert_eq!(payload.len(), 13);
        assert_eq!(payload[0], 0xFF);
        assert_eq!(payload[11], 0x33);
        assert_eq!(payload[12], 0x14);

        assert!(parse_hex("ff00").is_err());
        assert!(parse_hex("zz000000000000000000003314").is_err());
    }

    #[tokio::test]
    async fn test_rejected_peer_keeps_current_peer() {
        let (transport_tx, transport_rx) = transport_channel();
        let radio = SimulatedRadio::new().with_loopback(transport_tx);
        let monitor = radio.monitor();
        let (handle, _events) =
            EmulatorService::spawn(radio, &Settings::default(), transport_rx);
        let mut shell = Shell::new(handle.clone(), monitor.clone());

        shell.execute(ShellCommand::On).await.unwrap();
        shell.execute(ShellCommand::Connect(PeerId::new("phone"))).await.unwrap();
        assert_eq!(shell.peer, PeerId::new("phone"));

        shell.execute(ShellCommand::Connect(PeerId::new("tablet"))).await.unwrap();
        assert_eq!(shell.peer, PeerId::new("phone"));

        // Subscriptions still go out from the accepted peer
        shell
            .execute(ShellCommand::Subscribe(&profile::SENSOR_BUTTON))
            .await
            .unwrap();
        handle.press_button().unwrap();
        handle.status().await.unwrap();
        assert_eq!(
            monitor.notifications(),
            vec![(profile::SENSOR_BUTTON_CHARACTERISTIC_UUID, vec![0x01])]
        );
    }

    #[test]
    fn test_render_matrix() {
        let mut cells = [false; 99];
        cells[0] = true;
        cells[98] = true;
        let rendered = render_matrix(&LedMatrixCommand::new(cells, 1.0, 1.0));
        let rows: Vec<_> = rendered.lines().collect();
        assert_eq!(rows.len(), 9);
        assert_eq!(rows[0], "#..........");
        assert_eq!(rows[8], "..........#");
    }
}
