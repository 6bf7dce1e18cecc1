//! Nuimo GATT Profile
//!
//! The fixed service and characteristic table the emulator exposes. Nothing in
//! here changes at runtime; the state machine only ever looks entries up.

use uuid::Uuid;

/// Battery Service (0x180F)
pub const BATTERY_SERVICE_UUID: Uuid = Uuid::from_u128(0x0000180f_0000_1000_8000_00805f9b34fb);
/// Battery Level characteristic (0x2A19) - 1 byte, 0-100
pub const BATTERY_CHARACTERISTIC_UUID: Uuid =
    Uuid::from_u128(0x00002a19_0000_1000_8000_00805f9b34fb);

/// Device Information Service (0x180A)
pub const DEVICE_INFORMATION_SERVICE_UUID: Uuid =
    Uuid::from_u128(0x0000180a_0000_1000_8000_00805f9b34fb);
/// Manufacturer Name characteristic (0x2A29)
pub const DEVICE_INFORMATION_CHARACTERISTIC_UUID: Uuid =
    Uuid::from_u128(0x00002a29_0000_1000_8000_00805f9b34fb);

/// LED Matrix Service
pub const LED_MATRIX_SERVICE_UUID: Uuid = Uuid::from_u128(0xf29b1523_cb19_40f3_be5c_7241ecb82fd1);
/// LED Matrix characteristic - 13 byte write payload
pub const LED_MATRIX_CHARACTERISTIC_UUID: Uuid =
    Uuid::from_u128(0xf29b1524_cb19_40f3_be5c_7241ecb82fd1);

/// Sensor Service - the one UUID included in the advertisement
pub const SENSOR_SERVICE_UUID: Uuid = Uuid::from_u128(0xf29b1525_cb19_40f3_be5c_7241ecb82fd2);
pub const SENSOR_FLY_CHARACTERISTIC_UUID: Uuid =
    Uuid::from_u128(0xf29b1526_cb19_40f3_be5c_7241ecb82fd2);
pub const SENSOR_TOUCH_CHARACTERISTIC_UUID: Uuid =
    Uuid::from_u128(0xf29b1527_cb19_40f3_be5c_7241ecb82fd2);
pub const SENSOR_ROTATION_CHARACTERISTIC_UUID: Uuid =
    Uuid::from_u128(0xf29b1528_cb19_40f3_be5c_7241ecb82fd2);
pub const SENSOR_BUTTON_CHARACTERISTIC_UUID: Uuid =
    Uuid::from_u128(0xf29b1529_cb19_40f3_be5c_7241ecb82fd2);

/// Client Characteristic Configuration Descriptor (0x2902)
pub const CHARACTERISTIC_NOTIFICATION_DESCRIPTOR_UUID: Uuid =
    Uuid::from_u128(0x00002902_0000_1000_8000_00805f9b34fb);

/// CCCD value a peer writes to enable notifications
pub const ENABLE_NOTIFICATION_VALUE: [u8; 2] = [0x01, 0x00];
/// CCCD value a peer writes to disable notifications
pub const DISABLE_NOTIFICATION_VALUE: [u8; 2] = [0x00, 0x00];

/// Characteristic access properties as declared to peers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Property {
    Read,
    Write,
    Notify,
}

/// Attribute permissions enforced by the server
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    Read,
    Write,
}

#[derive(Debug, PartialEq, Eq)]
pub struct CharacteristicDescriptor {
    pub uuid: Uuid,
    pub properties: &'static [Property],
    pub permissions: &'static [Permission],
}

impl CharacteristicDescriptor {
    pub fn has_property(&self, property: Property) -> bool {
        self.properties.contains(&property)
    }

    pub fn has_permission(&self, permission: Permission) -> bool {
        self.permissions.contains(&permission)
    }

    /// Notify characteristics expose a CCCD to the transport, all others don't
    pub fn has_notification_descriptor(&self) -> bool {
        self.has_property(Property::Notify)
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct ServiceDescriptor {
    pub uuid: Uuid,
    pub characteristics: &'static [CharacteristicDescriptor],
}

pub const BATTERY_LEVEL: CharacteristicDescriptor = CharacteristicDescriptor {
    uuid: BATTERY_CHARACTERISTIC_UUID,
    properties: &[Property::Read, Property::Notify],
    permissions: &[Permission::Read],
};

pub const DEVICE_INFORMATION: CharacteristicDescriptor = CharacteristicDescriptor {
    uuid: DEVICE_INFORMATION_CHARACTERISTIC_UUID,
    properties: &[Property::Read],
    permissions: &[Permission::Read],
};

pub const LED_MATRIX: CharacteristicDescriptor = CharacteristicDescriptor {
    uuid: LED_MATRIX_CHARACTERISTIC_UUID,
    properties: &[Property::Write],
    permissions: &[Permission::Write],
};

pub const SENSOR_FLY: CharacteristicDescriptor = CharacteristicDescriptor {
    uuid: SENSOR_FLY_CHARACTERISTIC_UUID,
    properties: &[Property::Notify],
    permissions: &[Permission::Read],
};

pub const SENSOR_TOUCH: CharacteristicDescriptor = CharacteristicDescriptor {
    uuid: SENSOR_TOUCH_CHARACTERISTIC_UUID,
    properties: &[Property::Notify],
    permissions: &[Permission::Read],
};

pub const SENSOR_ROTATION: CharacteristicDescriptor = CharacteristicDescriptor {
    uuid: SENSOR_ROTATION_CHARACTERISTIC_UUID,
    properties: &[Property::Notify],
    permissions: &[Permission::Read],
};

pub const SENSOR_BUTTON: CharacteristicDescriptor = CharacteristicDescriptor {
    uuid: SENSOR_BUTTON_CHARACTERISTIC_UUID,
    properties: &[Property::Notify],
    permissions: &[Permission::Read],
};

/// All services in registration order
pub static SERVICES: [ServiceDescriptor; 4] = [
    ServiceDescriptor {
        uuid: BATTERY_SERVICE_UUID,
        characteristics: &[BATTERY_LEVEL],
    },
    ServiceDescriptor {
        uuid: DEVICE_INFORMATION_SERVICE_UUID,
        characteristics: &[DEVICE_INFORMATION],
    },
    ServiceDescriptor {
        uuid: LED_MATRIX_SERVICE_UUID,
        characteristics: &[LED_MATRIX],
    },
    ServiceDescriptor {
        uuid: SENSOR_SERVICE_UUID,
        characteristics: &[SENSOR_FLY, SENSOR_TOUCH, SENSOR_ROTATION, SENSOR_BUTTON],
    },
];

/// Look up a service by UUID
pub fn service(uuid: Uuid) -> Option<&'static ServiceDescriptor> {
    SERVICES.iter().find(|s| s.uuid == uuid)
}

/// Look up a characteristic by UUID across all services
pub fn characteristic(uuid: Uuid) -> Option<&'static CharacteristicDescriptor> {
    SERVICES
        .iter()
        .flat_map(|s| s.characteristics.iter())
        .find(|c| c.uuid == uuid)
}

/// Find the service that owns a characteristic
pub fn service_for_characteristic(uuid: Uuid) -> Option<&'static ServiceDescriptor> {
    SERVICES
        .iter()
        .find(|s| s.characteristics.iter().any(|c| c.uuid == uuid))
}

/// Parse a characteristic by short name, used by the console shell
pub fn characteristic_by_name(name: &str) -> Option<&'static CharacteristicDescriptor> {
    match name.to_lowercase().as_str() {
        "battery" => Some(&BATTERY_LEVEL),
        "info" | "device-info" => Some(&DEVICE_INFORMATION),
        "led" | "matrix" => Some(&LED_MATRIX),
        "fly" => Some(&SENSOR_FLY),
        "touch" => Some(&SENSOR_TOUCH),
        "rotation" => Some(&SENSOR_ROTATION),
        "button" => Some(&SENSOR_BUTTON),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_shape() {
        assert_eq!(SERVICES.len(), 4);
        let total: usize = SERVICES.iter().map(|s| s.characteristics.len()).sum();
        assert_eq!(total, 7);
        assert_eq!(service(SENSOR_SERVICE_UUID).unwrap().characteristics.len(), 4);
    }

    #[test]
    fn test_uuid_constants() {
        assert_eq!(
            SENSOR_SERVICE_UUID.to_string(),
            "f29b1525-cb19-40f3-be5c-7241ecb82fd2"
        );
        assert_eq!(
            BATTERY_CHARACTERISTIC_UUID.to_string(),
            "00002a19-0000-1000-8000-00805f9b34fb"
        );
    }

    #[test]
    fn test_notification_descriptor_only_on_notify() {
        for c in SERVICES.iter().flat_map(|s| s.characteristics.iter()) {
            assert_eq!(
                c.has_notification_descriptor(),
                c.properties.contains(&Property::Notify)
            );
        }
        assert!(BATTERY_LEVEL.has_notification_descriptor());
        assert!(!LED_MATRIX.has_notification_descriptor());
        assert!(!DEVICE_INFORMATION.has_notification_descriptor());
    }

    #[test]
    fn test_lookup() {
        assert_eq!(
            characteristic(SENSOR_BUTTON_CHARACTERISTIC_UUID),
            Some(&SENSOR_BUTTON)
        );
        assert_eq!(
            service_for_characteristic(LED_MATRIX_CHARACTERISTIC_UUID).map(|s| s.uuid),
            Some(LED_MATRIX_SERVICE_UUID)
        );
        assert!(characteristic(CHARACTERISTIC_NOTIFICATION_DESCRIPTOR_UUID).is_none());
        assert!(LED_MATRIX.has_permission(Permission::Write));
        assert!(!LED_MATRIX.has_permission(Permission::Read));
    }
}
