//! Sony Alpha/ZV protocol
//!
//! Two packet families share the codec; decoding picks one by length.
//!
//! ```text
//! Time Area (13 bytes, big-endian)
//! [0-2]   : header 0C 00 00
//! [3-4]   : year (u16)
//! [5-9]   : month, day, hour, minute, second (local time)
//! [10]    : DST flag (0/1)
//! [11]    : UTC offset hours (i8)
//! [12]    : UTC offset minutes (magnitude)
//!
//! Location (91 or 95 bytes, big-endian)
//! [0-1]   : payload length, excluding these two bytes
//! [2-4]   : header 08 02 FC
//! [5]     : 03 = time-zone suffix present, 00 = absent
//! [6-10]  : 00 00 10 10 10
//! [11-14] : latitude  x 10^7 (i32)
//! [15-18] : longitude x 10^7 (i32)
//! [19-20] : year (u16, UTC)
//! [21-25] : month, day, hour, minute, second (UTC)
//! [26-90] : zero padding
//! [91-92] : UTC offset minutes (i16)      } only when [5] == 03
//! [93-94] : DST offset minutes (i16)      }
//! ```
//!
//! The Time Area offset encoding loses the sign of offsets strictly between
//! -1:00 and 0:00 (the hours byte becomes 0). Camera firmware expects exactly
//! this, so both directions keep the behaviour.

use super::{
    naive_from_fields, require_len, CameraDateTime, DecodedLocation, ProtocolCodec, RemoteCommand,
};
use crate::domain::location::GpsLocation;
use crate::error::{CodecError, CodecResult};
use crate::infrastructure::bluetooth::gatt::{
    uuid16, GattEndpoint, GattSpec, DEVICE_INFO_SERVICE, DEVICE_NAME_CHAR, FIRMWARE_REVISION_CHAR,
    GAP_SERVICE, HARDWARE_REVISION_CHAR,
};
use chrono::{DateTime, Datelike, Duration, NaiveDateTime, Timelike};
use chrono_tz::{OffsetComponents, Tz};
use uuid::Uuid;

pub const REMOTE_SERVICE_UUID: Uuid = Uuid::from_u128(0x8000ff00_ff00_ffff_ffff_ffffffffffff);
pub const LOCATION_SERVICE_UUID: Uuid = Uuid::from_u128(0x8000dd00_dd00_ffff_ffff_ffffffffffff);
pub const DATE_TIME_SERVICE_UUID: Uuid = Uuid::from_u128(0x8000cc00_cc00_ffff_ffff_ffffffffffff);
pub const PAIRING_SERVICE_UUID: Uuid = Uuid::from_u128(0x8000ee00_ee00_ffff_ffff_ffffffffffff);

pub const REMOTE_COMMAND_CHAR_UUID: Uuid = uuid16(0xFF01);
pub const LOCATION_STATUS_CHAR_UUID: Uuid = uuid16(0xDD01);
pub const LOCATION_CHAR_UUID: Uuid = uuid16(0xDD11);
pub const LOCATION_CONFIG_CHAR_UUID: Uuid = uuid16(0xDD21);
pub const LOCATION_LOCK_CHAR_UUID: Uuid = uuid16(0xDD30);
pub const LOCATION_ENABLE_CHAR_UUID: Uuid = uuid16(0xDD31);
pub const TIME_CORRECTION_CHAR_UUID: Uuid = uuid16(0xDD32);
pub const AREA_ADJUSTMENT_CHAR_UUID: Uuid = uuid16(0xDD33);
pub const TIME_AREA_CHAR_UUID: Uuid = uuid16(0xCC13);
pub const PAIRING_CHAR_UUID: Uuid = uuid16(0xEE01);

/// Bluetooth SIG company identifier
pub const COMPANY_ID: u16 = 0x012D;

/// Device-type field (u16 little-endian at offset 0) for cameras
pub const CAMERA_DEVICE_TYPE: u16 = 0x0003;

pub const SCAN_SERVICE_UUIDS: &[Uuid] = &[REMOTE_SERVICE_UUID];
pub const NAME_PREFIXES: &[&str] = &["ILCE-", "ILME-", "DSC-", "ZV-"];

pub const TIME_AREA_LEN: usize = 13;
pub const LOCATION_LEN_WITHOUT_TIME_ZONE: usize = 91;
pub const LOCATION_LEN_WITH_TIME_ZONE: usize = 95;

const TIME_AREA_HEADER: [u8; 3] = [0x0C, 0x00, 0x00];
const LOCATION_HEADER: [u8; 3] = [0x08, 0x02, 0xFC];
const LOCATION_FIXED_PADDING: [u8; 5] = [0x00, 0x00, 0x10, 0x10, 0x10];
const LOCATION_ZERO_PADDING: usize = 65;
const FLAG_WITH_TIME_ZONE: u8 = 0x03;
const FLAG_WITHOUT_TIME_ZONE: u8 = 0x00;
const COORDINATE_SCALE: f64 = 10_000_000.0;

/// Control values for the lock/enable characteristics.
pub const LOCK: [u8; 1] = [0x01];
pub const UNLOCK: [u8; 1] = [0x00];
pub const ENABLE: [u8; 1] = [0x01];
pub const DISABLE: [u8; 1] = [0x00];

const PAIRING_INIT: [u8; 6] = [0x06, 0x08, 0x01, 0x00, 0x00, 0x00];

pub const GATT_SPEC: GattSpec = GattSpec {
    location: Some(GattEndpoint::new(LOCATION_SERVICE_UUID, LOCATION_CHAR_UUID)),
    date_time: Some(GattEndpoint::new(DATE_TIME_SERVICE_UUID, TIME_AREA_CHAR_UUID)),
    geo_tagging: None,
    device_name: Some(GattEndpoint::new(GAP_SERVICE, DEVICE_NAME_CHAR)),
    firmware_version: Some(GattEndpoint::new(DEVICE_INFO_SERVICE, FIRMWARE_REVISION_CHAR)),
    hardware_revision: Some(GattEndpoint::new(DEVICE_INFO_SERVICE, HARDWARE_REVISION_CHAR)),
    pairing: Some(GattEndpoint::new(PAIRING_SERVICE_UUID, PAIRING_CHAR_UUID)),
    remote_control: Some(GattEndpoint::new(REMOTE_SERVICE_UUID, REMOTE_COMMAND_CHAR_UUID)),
    location_status: Some(GattEndpoint::new(LOCATION_SERVICE_UUID, LOCATION_STATUS_CHAR_UUID)),
    location_lock: Some(GattEndpoint::new(LOCATION_SERVICE_UUID, LOCATION_LOCK_CHAR_UUID)),
    location_enable: Some(GattEndpoint::new(LOCATION_SERVICE_UUID, LOCATION_ENABLE_CHAR_UUID)),
    time_correction: Some(GattEndpoint::new(LOCATION_SERVICE_UUID, TIME_CORRECTION_CHAR_UUID)),
    area_adjustment: Some(GattEndpoint::new(LOCATION_SERVICE_UUID, AREA_ADJUSTMENT_CHAR_UUID)),
    location_config: Some(GattEndpoint::new(LOCATION_SERVICE_UUID, LOCATION_CONFIG_CHAR_UUID)),
};

/// Local time plus zone information as carried by the Time Area packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeArea {
    pub local: NaiveDateTime,
    /// Standard (non-DST) offset from UTC
    pub offset_minutes: i32,
    pub dst: bool,
}

impl TimeArea {
    pub fn from_zoned(date_time: &DateTime<Tz>) -> Self {
        let offset = date_time.offset();
        Self {
            local: date_time.naive_local(),
            offset_minutes: offset.base_utc_offset().num_minutes() as i32,
            dst: offset.dst_offset() != Duration::zero(),
        }
    }
}

/// Either packet family, as selected by length.
#[derive(Debug, Clone, PartialEq)]
pub enum SonyPacket {
    TimeArea(TimeArea),
    Location(DecodedLocation),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SonyCodec {
    /// Append the 4-byte time-zone/DST suffix (95-byte packet)
    pub include_time_zone: bool,
}

impl SonyCodec {
    /// Used until the capability probe says otherwise.
    pub const DEFAULT: SonyCodec = SonyCodec {
        include_time_zone: true,
    };

    pub const fn new(include_time_zone: bool) -> Self {
        Self { include_time_zone }
    }

    pub fn location_len(&self) -> usize {
        if self.include_time_zone {
            LOCATION_LEN_WITH_TIME_ZONE
        } else {
            LOCATION_LEN_WITHOUT_TIME_ZONE
        }
    }
}

impl Default for SonyCodec {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Read bit 1 of byte 4 of the location config blob.
///
/// `None` when the blob is too short to say.
pub fn time_zone_support_from_config(blob: &[u8]) -> Option<bool> {
    blob.get(4).map(|b| b & 0x02 != 0)
}

/// Manufacturer data layout: `[device type u16 LE][protocol version u16 LE]...`
pub fn parse_protocol_version(manufacturer_data: &[u8]) -> Option<u16> {
    match manufacturer_data {
        [_, _, lo, hi, ..] => Some(u16::from_le_bytes([*lo, *hi])),
        _ => None,
    }
}

pub fn encode_time_area(area: &TimeArea) -> Vec<u8> {
    let local = &area.local;
    let mut out = Vec::with_capacity(TIME_AREA_LEN);
    out.extend_from_slice(&TIME_AREA_HEADER);
    out.extend_from_slice(&(local.year() as u16).to_be_bytes());
    out.push(local.month() as u8);
    out.push(local.day() as u8);
    out.push(local.hour() as u8);
    out.push(local.minute() as u8);
    out.push(local.second() as u8);
    out.push(u8::from(area.dst));
    // Truncating division: -0:30 yields hours 0 and the sign is gone.
    out.push((area.offset_minutes / 60) as i8 as u8);
    out.push((area.offset_minutes % 60).unsigned_abs() as u8);
    out
}

fn decode_time_area(bytes: &[u8]) -> CodecResult<TimeArea> {
    require_len("time area", bytes, TIME_AREA_LEN)?;
    let year = u16::from_be_bytes([bytes[3], bytes[4]]);
    let local = naive_from_fields(
        i32::from(year),
        bytes[5],
        bytes[6],
        bytes[7],
        bytes[8],
        bytes[9],
    )?;
    let hours = i32::from(bytes[11] as i8);
    let minutes = i32::from(bytes[12]);
    let offset_minutes = if hours < 0 {
        hours * 60 - minutes
    } else {
        hours * 60 + minutes
    };
    Ok(TimeArea {
        local,
        offset_minutes,
        dst: bytes[10] != 0,
    })
}

fn decode_location_packet(bytes: &[u8]) -> CodecResult<DecodedLocation> {
    require_len("location", bytes, LOCATION_LEN_WITHOUT_TIME_ZONE)?;
    if bytes[2..5] != LOCATION_HEADER {
        return Err(CodecError::InvalidPayload {
            length: bytes.len(),
            reason: format!("unexpected location header {:02X?}", &bytes[2..5]),
        });
    }

    let include_time_zone = match bytes[5] {
        FLAG_WITH_TIME_ZONE => true,
        FLAG_WITHOUT_TIME_ZONE => false,
        other => {
            return Err(CodecError::InvalidPayload {
                length: bytes.len(),
                reason: format!("unknown location flag {other:#04X}"),
            })
        }
    };
    if include_time_zone {
        require_len("location", bytes, LOCATION_LEN_WITH_TIME_ZONE)?;
    }

    let latitude = i32::from_be_bytes([bytes[11], bytes[12], bytes[13], bytes[14]]);
    let longitude = i32::from_be_bytes([bytes[15], bytes[16], bytes[17], bytes[18]]);
    let year = u16::from_be_bytes([bytes[19], bytes[20]]);
    let timestamp = naive_from_fields(
        i32::from(year),
        bytes[21],
        bytes[22],
        bytes[23],
        bytes[24],
        bytes[25],
    )?
    .and_utc();

    let (utc_offset_minutes, dst_offset_minutes) = if include_time_zone {
        (
            Some(i16::from_be_bytes([bytes[91], bytes[92]])),
            Some(i16::from_be_bytes([bytes[93], bytes[94]])),
        )
    } else {
        (None, None)
    };

    Ok(DecodedLocation {
        latitude: f64::from(latitude) / COORDINATE_SCALE,
        longitude: f64::from(longitude) / COORDINATE_SCALE,
        altitude: None,
        timestamp,
        utc_offset_minutes,
        dst_offset_minutes,
    })
}

/// Decode either packet family, choosing by payload length.
pub fn decode_packet(bytes: &[u8]) -> CodecResult<SonyPacket> {
    match bytes.len() {
        TIME_AREA_LEN => decode_time_area(bytes).map(SonyPacket::TimeArea),
        len if len >= LOCATION_LEN_WITHOUT_TIME_ZONE => {
            decode_location_packet(bytes).map(SonyPacket::Location)
        }
        len => Err(CodecError::InvalidPayload {
            length: len,
            reason: format!(
                "expected {TIME_AREA_LEN} (time area) or at least \
                 {LOCATION_LEN_WITHOUT_TIME_ZONE} (location) bytes"
            ),
        }),
    }
}

impl ProtocolCodec for SonyCodec {
    fn encode_date_time(&self, date_time: &DateTime<Tz>) -> Vec<u8> {
        encode_time_area(&TimeArea::from_zoned(date_time))
    }

    fn decode_date_time(&self, bytes: &[u8]) -> CodecResult<CameraDateTime> {
        match decode_packet(bytes)? {
            SonyPacket::TimeArea(area) => Ok(CameraDateTime {
                local: area.local,
                utc_offset_minutes: Some(area.offset_minutes),
                dst: Some(area.dst),
            }),
            SonyPacket::Location(_) => Err(CodecError::InvalidPayload {
                length: bytes.len(),
                reason: "location packet where time area was expected".to_string(),
            }),
        }
    }

    fn encode_location(&self, location: &GpsLocation, zone: Tz) -> Vec<u8> {
        let total = self.location_len();
        let utc = location.timestamp.naive_utc();

        let mut out = Vec::with_capacity(total);
        out.extend_from_slice(&((total - 2) as u16).to_be_bytes());
        out.extend_from_slice(&LOCATION_HEADER);
        out.push(if self.include_time_zone {
            FLAG_WITH_TIME_ZONE
        } else {
            FLAG_WITHOUT_TIME_ZONE
        });
        out.extend_from_slice(&LOCATION_FIXED_PADDING);
        out.extend_from_slice(&((location.latitude * COORDINATE_SCALE).round() as i32).to_be_bytes());
        out.extend_from_slice(&((location.longitude * COORDINATE_SCALE).round() as i32).to_be_bytes());
        out.extend_from_slice(&(utc.year() as u16).to_be_bytes());
        out.push(utc.month() as u8);
        out.push(utc.day() as u8);
        out.push(utc.hour() as u8);
        out.push(utc.minute() as u8);
        out.push(utc.second() as u8);
        out.resize(out.len() + LOCATION_ZERO_PADDING, 0x00);

        if self.include_time_zone {
            let local = location.timestamp.with_timezone(&zone);
            let offset = local.offset();
            let base = offset.base_utc_offset().num_minutes() as i16;
            let dst = offset.dst_offset().num_minutes() as i16;
            out.extend_from_slice(&base.to_be_bytes());
            out.extend_from_slice(&dst.to_be_bytes());
        }
        out
    }

    fn decode_location(&self, bytes: &[u8]) -> CodecResult<DecodedLocation> {
        match decode_packet(bytes)? {
            SonyPacket::Location(location) => Ok(location),
            SonyPacket::TimeArea(_) => Err(CodecError::InvalidPayload {
                length: bytes.len(),
                reason: "time area packet where location was expected".to_string(),
            }),
        }
    }

    fn encode_remote_command(&self, command: RemoteCommand) -> CodecResult<Vec<u8>> {
        let code = match command {
            RemoteCommand::FocusUp => 0x06,
            RemoteCommand::FocusDown => 0x07,
            RemoteCommand::ShutterUp => 0x08,
            RemoteCommand::ShutterDown => 0x09,
        };
        Ok(vec![0x01, code])
    }

    fn pairing_init_payload(&self) -> Option<Vec<u8>> {
        Some(PAIRING_INIT.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone, Utc};

    fn naive(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, mo, d)
            .unwrap()
            .and_hms_opt(h, mi, s)
            .unwrap()
    }

    #[test]
    fn test_time_area_layout() {
        let dt = chrono_tz::Europe::Berlin
            .with_ymd_and_hms(2024, 7, 1, 14, 30, 15)
            .unwrap();
        let bytes = SonyCodec::DEFAULT.encode_date_time(&dt);
        assert_eq!(
            bytes,
            vec![0x0C, 0x00, 0x00, 0x07, 0xE8, 7, 1, 14, 30, 15, 1, 1, 0]
        );
    }

    #[test]
    fn test_time_area_negative_offset() {
        // Newfoundland winter: -3:30, no DST
        let dt = chrono_tz::America::St_Johns
            .with_ymd_and_hms(2024, 1, 10, 8, 0, 0)
            .unwrap();
        let bytes = SonyCodec::DEFAULT.encode_date_time(&dt);
        assert_eq!(&bytes[10..], &[0, (-3i8) as u8, 30]);

        let decoded = SonyCodec::DEFAULT.decode_date_time(&bytes).unwrap();
        assert_eq!(decoded.local, naive(2024, 1, 10, 8, 0, 0));
        assert_eq!(decoded.utc_offset_minutes, Some(-210));
        assert_eq!(decoded.dst, Some(false));
    }

    #[test]
    fn test_time_area_round_trip_outside_defect_range() {
        for offset in [-600, -330, -60, 0, 45, 330, 345, 780] {
            let area = TimeArea {
                local: naive(2025, 2, 28, 23, 59, 59),
                offset_minutes: offset,
                dst: offset == 60,
            };
            match decode_packet(&encode_time_area(&area)).unwrap() {
                SonyPacket::TimeArea(decoded) => assert_eq!(decoded, area, "offset {offset}"),
                other => panic!("unexpected packet {other:?}"),
            }
        }
    }

    #[test]
    fn test_time_area_sign_loss_between_minus_one_hour_and_zero() {
        for offset in [-59, -45, -30, -1] {
            let area = TimeArea {
                local: naive(2024, 6, 1, 12, 0, 0),
                offset_minutes: offset,
                dst: false,
            };
            let bytes = encode_time_area(&area);
            assert_eq!(bytes[11], 0, "hours byte for {offset}");
            assert_eq!(bytes[12], offset.unsigned_abs() as u8);

            match decode_packet(&bytes).unwrap() {
                SonyPacket::TimeArea(decoded) => {
                    assert_eq!(decoded.offset_minutes, -offset);
                }
                other => panic!("unexpected packet {other:?}"),
            }
        }
    }

    #[test]
    fn test_location_packet_with_time_zone() {
        let timestamp = Utc.with_ymd_and_hms(2024, 7, 1, 12, 34, 56).unwrap();
        let fix = GpsLocation::new(35.6586, 139.7454, 40.0, 3.0, timestamp);
        let bytes = SonyCodec::new(true).encode_location(&fix, chrono_tz::Europe::Berlin);

        assert_eq!(bytes.len(), 95);
        assert_eq!(&bytes[0..2], &[0x00, 0x5D]);
        assert_eq!(&bytes[2..5], &[0x08, 0x02, 0xFC]);
        assert_eq!(bytes[5], 0x03);
        assert_eq!(&bytes[6..11], &[0x00, 0x00, 0x10, 0x10, 0x10]);
        assert_eq!(&bytes[11..15], &356_586_000i32.to_be_bytes());
        assert_eq!(&bytes[15..19], &1_397_454_000i32.to_be_bytes());
        assert_eq!(&bytes[19..26], &[0x07, 0xE8, 7, 1, 12, 34, 56]);
        assert!(bytes[26..91].iter().all(|b| *b == 0));
        assert_eq!(&bytes[91..93], &60i16.to_be_bytes());
        assert_eq!(&bytes[93..95], &60i16.to_be_bytes());
    }

    #[test]
    fn test_location_packet_without_time_zone() {
        let timestamp = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let fix = GpsLocation::new(-22.9519, -43.2105, 700.0, 8.0, timestamp);
        let bytes = SonyCodec::new(false).encode_location(&fix, chrono_tz::America::Sao_Paulo);

        assert_eq!(bytes.len(), 91);
        assert_eq!(&bytes[0..2], &[0x00, 0x59]);
        assert_eq!(bytes[5], 0x00);
        assert_eq!(&bytes[11..15], &(-229_519_000i32).to_be_bytes());

        let decoded = SonyCodec::DEFAULT.decode_location(&bytes).unwrap();
        assert!((decoded.latitude - fix.latitude).abs() < 1e-7);
        assert!((decoded.longitude - fix.longitude).abs() < 1e-7);
        assert_eq!(decoded.timestamp, timestamp);
        assert_eq!(decoded.utc_offset_minutes, None);
    }

    #[test]
    fn test_location_decode_reads_time_zone_suffix() {
        let timestamp = Utc.with_ymd_and_hms(2024, 1, 15, 6, 0, 0).unwrap();
        let fix = GpsLocation::new(40.7128, -74.006, 10.0, 3.0, timestamp);
        let bytes = SonyCodec::DEFAULT.encode_location(&fix, chrono_tz::America::New_York);

        let decoded = SonyCodec::DEFAULT.decode_location(&bytes).unwrap();
        assert_eq!(decoded.utc_offset_minutes, Some(-300));
        assert_eq!(decoded.dst_offset_minutes, Some(0));
    }

    #[test]
    fn test_decode_rejects_unknown_lengths() {
        for len in [0, 7, 12, 14, 32, 90] {
            assert!(
                matches!(
                    decode_packet(&vec![0u8; len]),
                    Err(CodecError::InvalidPayload { .. })
                ),
                "length {len}"
            );
        }
    }

    #[test]
    fn test_decode_rejects_wrong_family() {
        let area = TimeArea {
            local: naive(2024, 1, 1, 0, 0, 0),
            offset_minutes: 0,
            dst: false,
        };
        assert!(SonyCodec::DEFAULT
            .decode_location(&encode_time_area(&area))
            .is_err());
    }

    #[test]
    fn test_truncated_time_zone_suffix() {
        let timestamp = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let fix = GpsLocation::new(1.0, 1.0, 0.0, 1.0, timestamp);
        let mut bytes = SonyCodec::new(true).encode_location(&fix, chrono_tz::UTC);
        bytes.truncate(93);
        assert!(matches!(
            decode_packet(&bytes),
            Err(CodecError::LengthMismatch { .. })
        ));
    }

    #[test]
    fn test_config_probe_bit() {
        assert_eq!(time_zone_support_from_config(&[0, 0, 0, 0, 0x02]), Some(true));
        assert_eq!(time_zone_support_from_config(&[0, 0, 0, 0, 0xFD]), Some(false));
        assert_eq!(time_zone_support_from_config(&[0, 0, 0]), None);
    }

    #[test]
    fn test_manufacturer_protocol_version() {
        assert_eq!(parse_protocol_version(&[0x03, 0x00, 0x65, 0x00, 0x45]), Some(0x65));
        assert_eq!(parse_protocol_version(&[0x03, 0x00]), None);
    }

    #[test]
    fn test_remote_and_pairing_payloads() {
        let codec = SonyCodec::DEFAULT;
        assert_eq!(
            codec.encode_remote_command(RemoteCommand::ShutterDown).unwrap(),
            vec![0x01, 0x09]
        );
        assert_eq!(
            codec.encode_remote_command(RemoteCommand::FocusUp).unwrap(),
            vec![0x01, 0x06]
        );
        assert_eq!(
            codec.pairing_init_payload(),
            Some(vec![0x06, 0x08, 0x01, 0x00, 0x00, 0x00])
        );
        assert!(codec.encode_geo_tagging_enabled(true).is_err());
    }
}
