//! Datagram decoder for the leg-node wire format.
//!
//! A node sends one ASCII line per sample:
//!
//! ```text
//! <deviceId>,<angle>,<emg>,<ecg>
//! ESQ,45.5,120,300
//! ```
//!
//! There is no length prefix, checksum or escaping. Anything that does not
//! split into exactly four fields is a malformed frame.

use chrono::{DateTime, Utc};

use crate::error::{DecodeError, Result};
use crate::reading::DeviceReading;

/// Number of comma-separated fields in a frame.
pub const FIELD_COUNT: usize = 4;

const FIELD_SEPARATOR: char = ',';

/// Decode one datagram, stamping the reading with the current time.
pub fn decode(raw: &[u8]) -> Result<DeviceReading> {
    decode_at(raw, Utc::now())
}

/// Decode one datagram with an explicit receive time.
///
/// The device identifier is passed through verbatim; deciding whether it
/// belongs to a known node is the state store's job. Numeric values are not
/// range-checked, but the angle must be a finite number.
pub fn decode_at(raw: &[u8], received_at: DateTime<Utc>) -> Result<DeviceReading> {
    let text = std::str::from_utf8(raw)
        .map_err(|e| DecodeError::MalformedFrame(format!("payload is not UTF-8 ({})", e)))?;

    let fields: Vec<&str> = text.trim().split(FIELD_SEPARATOR).collect();
    if fields.len() != FIELD_COUNT {
        return Err(DecodeError::MalformedFrame(format!(
            "expected {} fields, got {}",
            FIELD_COUNT,
            fields.len()
        )));
    }

    let angle = parse_field::<f64>("angle", fields[1])?;
    // `nan`/`inf` parse as f64 but have no JSON representation.
    if !angle.is_finite() {
        return Err(DecodeError::InvalidNumeric {
            field: "angle",
            value: fields[1].to_string(),
        });
    }
    let emg = parse_field::<i64>("emg", fields[2])?;
    let ecg = parse_field::<i64>("ecg", fields[3])?;

    Ok(DeviceReading::new(fields[0], angle, emg, ecg, received_at))
}

fn parse_field<T: std::str::FromStr>(field: &'static str, value: &str) -> Result<T> {
    value
        .trim()
        .parse::<T>()
        .map_err(|_| DecodeError::InvalidNumeric {
            field,
            value: value.to_string(),
        })
}
