//! Data types shared by rtugate and its collaborators

pub mod clock;
pub mod device_info;
pub mod error;
pub mod product_info;

pub use clock::DeviceClock;
pub use device_info::DeviceRecord;
pub use error::{Error, Result};
pub use product_info::ProductInfo;
