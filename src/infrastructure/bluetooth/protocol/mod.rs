//! Camera wire protocols
//!
//! Each vendor supplies a stateless [`ProtocolCodec`] that turns domain values
//! into the exact byte layout its firmware expects, and back. Codecs do no
//! I/O; the connection delegates decide where and when the bytes go.

pub mod ricoh;
pub mod sony;

use crate::domain::location::GpsLocation;
use crate::error::{CodecError, CodecResult};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use chrono_tz::Tz;

/// Date/time as decoded from a camera packet.
///
/// `utc_offset_minutes` and `dst` are only present for protocols that carry
/// zone information.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CameraDateTime {
    pub local: NaiveDateTime,
    pub utc_offset_minutes: Option<i32>,
    pub dst: Option<bool>,
}

/// Location as decoded from a camera packet.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedLocation {
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: Option<f64>,
    pub timestamp: DateTime<Utc>,
    pub utc_offset_minutes: Option<i16>,
    pub dst_offset_minutes: Option<i16>,
}

/// Remote shutter button transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteCommand {
    FocusDown,
    FocusUp,
    ShutterDown,
    ShutterUp,
}

/// Half-press, full-press, release sequence for a single exposure.
pub const SHUTTER_SEQUENCE: &[RemoteCommand] = &[
    RemoteCommand::FocusDown,
    RemoteCommand::ShutterDown,
    RemoteCommand::ShutterUp,
    RemoteCommand::FocusUp,
];

/// Vendor wire codec.
pub trait ProtocolCodec: Send + Sync {
    fn encode_date_time(&self, date_time: &DateTime<Tz>) -> Vec<u8>;

    fn decode_date_time(&self, bytes: &[u8]) -> CodecResult<CameraDateTime>;

    /// `zone` supplies the offsets for protocols that embed them.
    fn encode_location(&self, location: &GpsLocation, zone: Tz) -> Vec<u8>;

    fn decode_location(&self, bytes: &[u8]) -> CodecResult<DecodedLocation>;

    fn encode_geo_tagging_enabled(&self, _enabled: bool) -> CodecResult<Vec<u8>> {
        Err(CodecError::Unsupported("geotagging"))
    }

    fn decode_geo_tagging_enabled(&self, _bytes: &[u8]) -> CodecResult<bool> {
        Err(CodecError::Unsupported("geotagging"))
    }

    fn encode_remote_command(&self, _command: RemoteCommand) -> CodecResult<Vec<u8>> {
        Err(CodecError::Unsupported("remote control"))
    }

    /// Payload written to the pairing characteristic right after bonding.
    fn pairing_init_payload(&self) -> Option<Vec<u8>> {
        None
    }
}

/// Fail unless `bytes` holds at least `expected` bytes.
pub(crate) fn require_len(packet: &'static str, bytes: &[u8], expected: usize) -> CodecResult<()> {
    if bytes.len() < expected {
        return Err(CodecError::LengthMismatch {
            packet,
            expected,
            actual: bytes.len(),
        });
    }
    Ok(())
}

/// Build a calendar value from decoded fields, rejecting impossible dates.
pub(crate) fn naive_from_fields(
    year: i32,
    month: u8,
    day: u8,
    hour: u8,
    minute: u8,
    second: u8,
) -> CodecResult<NaiveDateTime> {
    let date = NaiveDate::from_ymd_opt(year, month as u32, day as u32).ok_or(
        CodecError::FieldOutOfRange {
            field: "date",
            value: i64::from(year) * 10_000 + i64::from(month) * 100 + i64::from(day),
        },
    )?;
    date.and_hms_opt(hour as u32, minute as u32, second as u32)
        .ok_or(CodecError::FieldOutOfRange {
            field: "time",
            value: i64::from(hour) * 10_000 + i64::from(minute) * 100 + i64::from(second),
        })
}
