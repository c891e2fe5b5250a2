//! Device record structures

use std::fmt;

use chrono::NaiveDate;

use crate::product_info::{object_id, ProductInfo};

/// Device found on the bus
///
/// Produced by discovery collaborators; the gateway itself never creates or
/// persists one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceRecord {
    /// Unit id the device is addressed by
    pub logical_id: u8,

    /// Unit id of the physical device (differs for sub-devices)
    pub physical_id: u8,

    /// Register map identifier
    pub map_identifier: String,

    pub manufacturer: String,
    pub product_code: String,
    pub device_name: String,
    pub hardware_version: String,
    pub software_version: String,
    pub serial_number: String,

    /// User-assigned name
    pub user_defined_name: String,

    pub usage: u32,
    pub additional_information: [u32; 4],

    /// Installation date as configured on the device
    pub installation_date: Option<NaiveDate>,

    pub connected_device_id: String,
}

impl DeviceRecord {
    /// Minimal record for a device known only by its map identifier
    ///
    /// The device name defaults to the map identifier.
    pub fn new(logical_id: u8, physical_id: u8, map_identifier: impl Into<String>) -> Self {
        let map_identifier = map_identifier.into();
        Self {
            logical_id,
            physical_id,
            device_name: map_identifier.clone(),
            map_identifier,
            ..Default::default()
        }
    }

    /// Record populated from device identification objects
    ///
    /// Missing objects leave their field empty.
    pub fn from_product_info(logical_id: u8, physical_id: u8, info: &ProductInfo) -> Self {
        Self {
            logical_id,
            physical_id,
            map_identifier: info.get_or_empty(object_id::MAP_IDENTIFIER),
            manufacturer: info.get_or_empty(object_id::MANUFACTURER),
            product_code: info.get_or_empty(object_id::PRODUCT_CODE),
            device_name: info.get_or_empty(object_id::DEVICE_NAME),
            hardware_version: info.get_or_empty(object_id::HARDWARE_VERSION),
            software_version: info.get_or_empty(object_id::SOFTWARE_VERSION),
            serial_number: info.get_or_empty(object_id::SERIAL_NUMBER),
            ..Default::default()
        }
    }

    /// Check if this record describes a sub-device of another unit
    pub fn is_sub_device(&self) -> bool {
        self.logical_id != self.physical_id
    }
}

impl fmt::Display for DeviceRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Device[unit: {}/{}, map: {}, SN: {}]",
            self.logical_id, self.physical_id, self.map_identifier, self.serial_number
        )
    }
}
