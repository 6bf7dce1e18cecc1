use crate::domain::codec::LedMatrixCommand;
use std::fmt;
use uuid::Uuid;

/// Opaque identifier of a remote central, usually its Bluetooth address
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PeerId(pub String);

impl PeerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwipeDirection {
    Left,
    Right,
    Up,
    Down,
}

impl SwipeDirection {
    /// Byte sent on the Touch characteristic
    pub fn gatt_value(&self) -> u8 {
        match self {
            Self::Left => 0,
            Self::Right => 1,
            Self::Up => 2,
            Self::Down => 3,
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "left" | "l" => Some(Self::Left),
            "right" | "r" => Some(Self::Right),
            "up" | "u" => Some(Self::Up),
            "down" | "d" => Some(Self::Down),
            _ => None,
        }
    }
}

/// ATT/GATT status returned to the peer for each request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GattStatus {
    Success,
    ReadNotPermitted,
    WriteNotPermitted,
    RequestNotSupported,
    InvalidOffset,
    InvalidAttributeLength,
    Failure,
}

impl GattStatus {
    pub fn code(&self) -> u16 {
        match self {
            Self::Success => 0x00,
            Self::ReadNotPermitted => 0x02,
            Self::WriteNotPermitted => 0x03,
            Self::RequestNotSupported => 0x06,
            Self::InvalidOffset => 0x07,
            Self::InvalidAttributeLength => 0x0d,
            Self::Failure => 0x101,
        }
    }

    pub fn is_success(&self) -> bool {
        *self == Self::Success
    }
}

/// Connection state reported by the transport for a peer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Disconnecting,
}

/// Power state of the host radio
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RadioState {
    Off,
    TurningOn,
    On,
    TurningOff,
}

/// Reasons an advertisement could not be started
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdvertiseFailure {
    DataTooLarge,
    TooManyAdvertisers,
    AlreadyStarted,
    InternalError,
    FeatureUnsupported,
    Other(i32),
}

impl AdvertiseFailure {
    pub fn from_code(code: i32) -> Self {
        match code {
            1 => Self::DataTooLarge,
            2 => Self::TooManyAdvertisers,
            3 => Self::AlreadyStarted,
            4 => Self::InternalError,
            5 => Self::FeatureUnsupported,
            other => Self::Other(other),
        }
    }

    pub fn code(&self) -> i32 {
        match self {
            Self::DataTooLarge => 1,
            Self::TooManyAdvertisers => 2,
            Self::AlreadyStarted => 3,
            Self::InternalError => 4,
            Self::FeatureUnsupported => 5,
            Self::Other(code) => *code,
        }
    }
}

/// Raw host battery reading, as level out of scale
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatteryStatus {
    pub level: i32,
    pub scale: i32,
}

/// Advertising parameters requested from the transport
#[derive(Debug, Clone, PartialEq)]
pub struct AdvertiseRequest {
    pub include_device_name: bool,
    pub service_uuids: Vec<Uuid>,
    pub connectable: bool,
    /// Zero means advertise until stopped
    pub timeout_ms: u32,
    pub mode: AdvertiseMode,
    pub tx_power: TxPowerLevel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdvertiseMode {
    LowPower,
    Balanced,
    LowLatency,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxPowerLevel {
    UltraLow,
    Low,
    Medium,
    High,
}

/// Events delivered to the collaborator (GUI or shell)
#[derive(Debug, Clone, PartialEq)]
pub enum NuimoEvent {
    PowerOn,
    PowerOff,
    StartAdvertising,
    StartAdvertisingFailure(AdvertiseFailure),
    StopAdvertising,
    Connect(PeerId),
    Disconnect(PeerId),
    ReceiveLedMatrix(LedMatrixCommand),
}

/// Callbacks from the platform BLE stack, fed into the state machine
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    RadioStateChanged(RadioState),
    ServiceAdded {
        service: Uuid,
        status: GattStatus,
    },
    AdvertiseStarted,
    AdvertiseFailed(AdvertiseFailure),
    ConnectionStateChanged {
        peer: PeerId,
        status: GattStatus,
        state: ConnectionState,
    },
    CharacteristicReadRequest {
        peer: PeerId,
        request_id: i32,
        offset: u16,
        characteristic: Uuid,
    },
    CharacteristicWriteRequest {
        peer: PeerId,
        request_id: i32,
        characteristic: Uuid,
        prepared_write: bool,
        response_needed: bool,
        offset: u16,
        value: Option<Vec<u8>>,
    },
    DescriptorReadRequest {
        peer: PeerId,
        request_id: i32,
        offset: u16,
        characteristic: Uuid,
        descriptor: Uuid,
    },
    DescriptorWriteRequest {
        peer: PeerId,
        request_id: i32,
        characteristic: Uuid,
        descriptor: Uuid,
        prepared_write: bool,
        response_needed: bool,
        offset: u16,
        value: Option<Vec<u8>>,
    },
    ExecuteWrite {
        peer: PeerId,
        request_id: i32,
        execute: bool,
    },
    NotificationSent {
        peer: PeerId,
        status: GattStatus,
    },
    MtuChanged {
        peer: PeerId,
        mtu: u16,
    },
}

/// Coarse lifecycle phase, derived from the peripheral state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeripheralPhase {
    Off,
    RegisteringServices,
    Idle,
    Advertising,
    /// A peer reported `Connecting` and has not finished or given up yet
    Connecting,
    Connected,
}

/// Snapshot answered to status queries
#[derive(Debug, Clone, PartialEq)]
pub struct PeripheralStatus {
    pub is_on: bool,
    pub is_advertising: bool,
    pub connected_peer: Option<PeerId>,
    pub radio_supported: bool,
    pub phase: PeripheralPhase,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_swipe_values() {
        assert_eq!(SwipeDirection::Left.gatt_value(), 0);
        assert_eq!(SwipeDirection::Right.gatt_value(), 1);
        assert_eq!(SwipeDirection::Up.gatt_value(), 2);
        assert_eq!(SwipeDirection::Down.gatt_value(), 3);
        assert_eq!(SwipeDirection::parse("DOWN"), Some(SwipeDirection::Down));
        assert_eq!(SwipeDirection::parse("sideways"), None);
    }

    #[test]
    fn test_advertise_failure_codes() {
        assert_eq!(AdvertiseFailure::from_code(5), AdvertiseFailure::FeatureUnsupported);
        assert_eq!(AdvertiseFailure::from_code(42), AdvertiseFailure::Other(42));
        assert_eq!(AdvertiseFailure::TooManyAdvertisers.code(), 2);
    }

    #[test]
    fn test_gatt_status_codes() {
        assert_eq!(GattStatus::InvalidAttributeLength.code(), 0x0d);
        assert_eq!(GattStatus::RequestNotSupported.code(), 0x06);
        assert!(GattStatus::Success.is_success());
        assert!(!GattStatus::Failure.is_success());
    }
}
