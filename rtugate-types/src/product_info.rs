//! Read Device Identification (MEI 0x0E) objects

use std::collections::BTreeMap;

use crate::error::{Error, Result};

/// Object identifiers
pub mod object_id {
    pub const MANUFACTURER: u8 = 0x00;
    pub const MAP_IDENTIFIER: u8 = 0x01;
    pub const SOFTWARE_VERSION: u8 = 0x02;
    pub const DEVICE_NAME: u8 = 0x04;
    pub const SERIAL_NUMBER: u8 = 0x80;
    pub const PRODUCT_CODE: u8 = 0x81;
    pub const HARDWARE_VERSION: u8 = 0x82;
}

/// Identification objects reported by a device, ordered by object id
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProductInfo {
    objects: BTreeMap<u8, String>,
}

impl ProductInfo {
    /// PDU offset of the object count
    pub const NUM_OBJECTS_OFFSET: usize = 6;

    /// Parse a read-device-identification response PDU
    ///
    /// # Response Layout
    ///
    /// ```text
    /// [0x2B][0x0E][code][conformity][more][next_id][count]
    ///     then `count` times: [object_id][len][len bytes]
    /// ```
    ///
    /// Values are decoded as UTF-8 (lossy) with trailing NULs trimmed.
    pub fn parse(pdu: &[u8]) -> Result<Self> {
        let count = *pdu.get(Self::NUM_OBJECTS_OFFSET).ok_or_else(|| {
            Error::Parse(format!("Product info response too short: {} bytes", pdu.len()))
        })?;

        let mut objects = BTreeMap::new();
        let mut offset = Self::NUM_OBJECTS_OFFSET + 1;

        for index in 0..count {
            let header = pdu.get(offset..offset + 2).ok_or_else(|| {
                Error::Parse(format!("Object {} header truncated at offset {}", index, offset))
            })?;
            let (id, len) = (header[0], header[1] as usize);
            offset += 2;

            let value = pdu.get(offset..offset + len).ok_or_else(|| {
                Error::Parse(format!("Object 0x{:02X} truncated: {} bytes declared", id, len))
            })?;
            offset += len;

            objects.insert(id, decode_string(value));
        }

        Ok(Self { objects })
    }

    pub fn get(&self, id: u8) -> Option<&str> {
        self.objects.get(&id).map(String::as_str)
    }

    /// Object value or an empty string
    pub fn get_or_empty(&self, id: u8) -> String {
        self.get(id).unwrap_or_default().to_string()
    }

    pub fn insert(&mut self, id: u8, value: impl Into<String>) {
        self.objects.insert(id, value.into());
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u8, &str)> {
        self.objects.iter().map(|(id, value)| (*id, value.as_str()))
    }
}

fn decode_string(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes)
        .trim_end_matches('\0')
        .to_string()
}
