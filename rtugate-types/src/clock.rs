//! Device real-time clock record
//!
//! ```text
//! [reserved][year - 2000][month][day][hour][minute][ms_hi][ms_lo]
//! ```
//!
//! `ms` is `second * 1000 + millisecond`, big-endian.

use byteorder::{BigEndian, ByteOrder};
use chrono::{Datelike, NaiveDate, NaiveDateTime, Timelike};

use crate::error::{Error, Result};

/// Clock record as exchanged with the device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceClock(NaiveDateTime);

impl DeviceClock {
    /// Encoded record size
    pub const SIZE: usize = 8;

    /// First representable year
    pub const BASE_YEAR: i32 = 2000;

    pub fn new(datetime: NaiveDateTime) -> Result<Self> {
        let year = datetime.year();
        if !(Self::BASE_YEAR..=Self::BASE_YEAR + u8::MAX as i32).contains(&year) {
            return Err(Error::Validation(format!(
                "Year {} outside device clock range {}..={}",
                year,
                Self::BASE_YEAR,
                Self::BASE_YEAR + u8::MAX as i32
            )));
        }
        Ok(Self(datetime))
    }

    pub fn datetime(&self) -> NaiveDateTime {
        self.0
    }

    /// Encode the 8-byte record
    ///
    /// Sub-millisecond precision is dropped. A leap second is folded into
    /// the last millisecond of the minute.
    pub fn encode(&self) -> [u8; Self::SIZE] {
        let dt = self.0;
        let millis = (dt.second() * 1000 + dt.nanosecond() / 1_000_000).min(59_999) as u16;

        let mut record = [0u8; Self::SIZE];
        record[1] = (dt.year() - Self::BASE_YEAR) as u8;
        record[2] = dt.month() as u8;
        record[3] = dt.day() as u8;
        record[4] = dt.hour() as u8;
        record[5] = dt.minute() as u8;
        BigEndian::write_u16(&mut record[6..8], millis);
        record
    }

    /// Decode a record from the start of `buf`
    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() < Self::SIZE {
            return Err(Error::Parse(format!(
                "Clock record too short: {} bytes",
                buf.len()
            )));
        }

        let millis = BigEndian::read_u16(&buf[6..8]) as u32;
        let year = Self::BASE_YEAR + buf[1] as i32;

        NaiveDate::from_ymd_opt(year, buf[2] as u32, buf[3] as u32)
            .and_then(|date| {
                date.and_hms_milli_opt(
                    buf[4] as u32,
                    buf[5] as u32,
                    millis / 1000,
                    millis % 1000,
                )
            })
            .map(Self)
            .ok_or_else(|| Error::Parse(format!("Invalid clock record: {:02X?}", &buf[..Self::SIZE])))
    }
}

impl From<DeviceClock> for NaiveDateTime {
    fn from(clock: DeviceClock) -> Self {
        clock.0
    }
}
