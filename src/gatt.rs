//! # GATT Data Model
//!
//! Peripheral identities and the service/characteristic tree reported by a
//! connected peripheral. These are plain values: the sessions own and
//! replace them, readers get clones.

use std::fmt::Write as _;
use uuid::Uuid;

/// Shown wherever a peripheral name is absent or unreadable
pub const UNKNOWN_NAME: &str = "Unknown";

/// Bluetooth SIG base UUID (0000xxxx-0000-1000-8000-00805F9B34FB)
const BLUETOOTH_BASE_UUID: u128 = 0x00000000_0000_1000_8000_00805f9b34fb;

/// Expands a 16-bit SIG-assigned number (e.g. `0x180D`) into a full UUID
pub const fn uuid_from_u16(short: u16) -> Uuid {
    Uuid::from_u128(BLUETOOTH_BASE_UUID | ((short as u128) << 96))
}

/// A peripheral as seen at discovery time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeripheralRef {
    pub address: String,
    pub name: Option<String>,
    /// dBm at first sighting
    pub rssi: i16,
}

impl PeripheralRef {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            name: None,
            rssi: 0,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_rssi(mut self, rssi: i16) -> Self {
        self.rssi = rssi;
        self
    }

    /// Best-effort name for log lines
    pub fn display_name(&self) -> &str {
        match self.name.as_deref() {
            Some(name) if !name.is_empty() => name,
            _ => UNKNOWN_NAME,
        }
    }
}

/// The subset of GATT characteristic properties this tool cares about
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct CharProperties {
    pub read: bool,
    pub write: bool,
    pub notify: bool,
}

impl CharProperties {
    pub const READ: Self = Self { read: true, write: false, notify: false };
    pub const WRITE: Self = Self { read: false, write: true, notify: false };
    pub const NOTIFY: Self = Self { read: false, write: false, notify: true };

    pub fn union(self, other: Self) -> Self {
        Self {
            read: self.read || other.read,
            write: self.write || other.write,
            notify: self.notify || other.notify,
        }
    }
}

impl From<btleplug::api::CharPropFlags> for CharProperties {
    fn from(flags: btleplug::api::CharPropFlags) -> Self {
        use btleplug::api::CharPropFlags;
        Self {
            read: flags.contains(CharPropFlags::READ),
            write: flags.contains(CharPropFlags::WRITE)
                || flags.contains(CharPropFlags::WRITE_WITHOUT_RESPONSE),
            notify: flags.contains(CharPropFlags::NOTIFY)
                || flags.contains(CharPropFlags::INDICATE),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CharacteristicNode {
    pub uuid: Uuid,
    pub properties: CharProperties,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceNode {
    pub uuid: Uuid,
    pub characteristics: Vec<CharacteristicNode>,
}

impl ServiceNode {
    pub fn new(uuid: Uuid) -> Self {
        Self {
            uuid,
            characteristics: Vec::new(),
        }
    }

    pub fn with_characteristic(mut self, uuid: Uuid, properties: CharProperties) -> Self {
        self.characteristics.push(CharacteristicNode { uuid, properties });
        self
    }

    /// References to every characteristic in this service, in order
    pub fn characteristic_refs(&self) -> impl Iterator<Item = CharacteristicRef> + '_ {
        self.characteristics.iter().map(move |c| CharacteristicRef {
            service: self.uuid,
            characteristic: c.uuid,
        })
    }
}

/// Addresses one characteristic on the connected peripheral
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CharacteristicRef {
    pub service: Uuid,
    pub characteristic: Uuid,
}

/// Formats a payload as uppercase, space-separated hex (`4E 2B`)
pub fn hex_string(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 3);
    for (i, byte) in bytes.iter().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        let _ = write!(out, "{:02X}", byte);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uuid_from_u16() {
        assert_eq!(
            uuid_from_u16(0x180D).to_string(),
            "0000180d-0000-1000-8000-00805f9b34fb"
        );
    }

    #[test]
    fn test_hex_string() {
        assert_eq!(hex_string(&[0x4E, 0x2B]), "4E 2B");
        assert_eq!(hex_string(&[0x00, 0x0a, 0xff]), "00 0A FF");
        assert_eq!(hex_string(&[]), "");
    }

    #[test]
    fn test_display_name_falls_back_to_unknown() {
        assert_eq!(PeripheralRef::new("AA:BB:CC:DD:EE:FF").display_name(), "Unknown");
        assert_eq!(PeripheralRef::new("AA").with_name("").display_name(), "Unknown");
        assert_eq!(PeripheralRef::new("AA").with_name("HRM").display_name(), "HRM");
    }

    #[test]
    fn test_char_prop_flags_conversion() {
        use btleplug::api::CharPropFlags;
        let props = CharProperties::from(CharPropFlags::READ | CharPropFlags::NOTIFY);
        assert_eq!(props, CharProperties::READ.union(CharProperties::NOTIFY));
        assert!(!props.write);
    }

    #[test]
    fn test_characteristic_refs_carry_service() {
        let service = ServiceNode::new(uuid_from_u16(0x180D))
            .with_characteristic(uuid_from_u16(0x2A37), CharProperties::NOTIFY)
            .with_characteristic(uuid_from_u16(0x2A38), CharProperties::READ);

        let refs: Vec<_> = service.characteristic_refs().collect();
        assert_eq!(refs.len(), 2);
        assert!(refs.iter().all(|r| r.service == uuid_from_u16(0x180D)));
        assert_eq!(refs[1].characteristic, uuid_from_u16(0x2A38));
    }
}
