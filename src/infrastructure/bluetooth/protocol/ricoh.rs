//! Ricoh GR-series protocol
//!
//! Fixed-size packets, no session handshake.
//!
//! ```text
//! Date/time (7 bytes)
//! [0-1]  : year (u16 little-endian)
//! [2]    : month
//! [3]    : day
//! [4]    : hour
//! [5]    : minute
//! [6]    : second
//!
//! Location (32 bytes)
//! [0-7]   : latitude  (f64 big-endian, raw IEEE-754 bits)
//! [8-15]  : longitude (f64 big-endian)
//! [16-23] : altitude  (f64 big-endian)
//! [24-30] : fix time, UTC, date/time layout above
//! [31]    : padding
//!
//! Geotagging toggle (1 byte): 0 = off, 1 = on
//! ```

use super::{naive_from_fields, require_len, CameraDateTime, DecodedLocation, ProtocolCodec};
use crate::domain::location::GpsLocation;
use crate::error::CodecResult;
use crate::infrastructure::bluetooth::gatt::{
    GattEndpoint, GattSpec, DEVICE_INFO_SERVICE, DEVICE_NAME_CHAR, FIRMWARE_REVISION_CHAR,
    GAP_SERVICE, HARDWARE_REVISION_CHAR,
};
use chrono::{DateTime, Datelike, NaiveDateTime, Timelike};
use chrono_tz::Tz;
use uuid::Uuid;

/// Camera information service (date/time lives here)
pub const CAMERA_SERVICE_UUID: Uuid = Uuid::from_u128(0x4b445988_caa0_4dd3_941d_37b4f52aca86);

/// GPS control service
pub const GEO_SERVICE_UUID: Uuid = Uuid::from_u128(0x84a0dd62_e8aa_4b2f_9d7e_2e4d6d1d6c91);

pub const DATE_TIME_CHAR_UUID: Uuid = Uuid::from_u128(0xfa46bbdd_8a8f_4796_8cf3_aa58949b130a);
pub const LOCATION_CHAR_UUID: Uuid = Uuid::from_u128(0x28f59d60_8b8e_4fcd_a81f_61bdb46595a9);
pub const GEO_TAGGING_CHAR_UUID: Uuid = Uuid::from_u128(0xa36afdcf_6b67_4046_9be7_28fb67dbc071);

/// Bluetooth SIG company identifier
pub const COMPANY_ID: u16 = 0x065F;

/// Device-type field (u16 little-endian at offset 0) for cameras
pub const CAMERA_DEVICE_TYPE: u16 = 0x0001;

pub const SCAN_SERVICE_UUIDS: &[Uuid] = &[CAMERA_SERVICE_UUID];
pub const NAME_PREFIXES: &[&str] = &["GR", "RICOH"];

pub const DATE_TIME_LEN: usize = 7;
pub const LOCATION_LEN: usize = 32;

pub const GATT_SPEC: GattSpec = GattSpec {
    location: Some(GattEndpoint::new(GEO_SERVICE_UUID, LOCATION_CHAR_UUID)),
    date_time: Some(GattEndpoint::new(CAMERA_SERVICE_UUID, DATE_TIME_CHAR_UUID)),
    geo_tagging: Some(GattEndpoint::new(GEO_SERVICE_UUID, GEO_TAGGING_CHAR_UUID)),
    device_name: Some(GattEndpoint::new(GAP_SERVICE, DEVICE_NAME_CHAR)),
    firmware_version: Some(GattEndpoint::new(DEVICE_INFO_SERVICE, FIRMWARE_REVISION_CHAR)),
    hardware_revision: Some(GattEndpoint::new(DEVICE_INFO_SERVICE, HARDWARE_REVISION_CHAR)),
    ..GattSpec::EMPTY
};

#[derive(Debug, Default, Clone, Copy)]
pub struct RicohCodec;

fn write_date_time(out: &mut Vec<u8>, value: &NaiveDateTime) {
    out.extend_from_slice(&(value.year() as u16).to_le_bytes());
    out.push(value.month() as u8);
    out.push(value.day() as u8);
    out.push(value.hour() as u8);
    out.push(value.minute() as u8);
    out.push(value.second() as u8);
}

fn read_date_time(bytes: &[u8]) -> CodecResult<NaiveDateTime> {
    let year = u16::from_le_bytes([bytes[0], bytes[1]]);
    naive_from_fields(
        i32::from(year),
        bytes[2],
        bytes[3],
        bytes[4],
        bytes[5],
        bytes[6],
    )
}

fn read_f64_be(bytes: &[u8], offset: usize) -> f64 {
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&bytes[offset..offset + 8]);
    f64::from_bits(u64::from_be_bytes(raw))
}

impl ProtocolCodec for RicohCodec {
    fn encode_date_time(&self, date_time: &DateTime<Tz>) -> Vec<u8> {
        let mut out = Vec::with_capacity(DATE_TIME_LEN);
        write_date_time(&mut out, &date_time.naive_local());
        out
    }

    fn decode_date_time(&self, bytes: &[u8]) -> CodecResult<CameraDateTime> {
        require_len("date/time", bytes, DATE_TIME_LEN)?;
        Ok(CameraDateTime {
            local: read_date_time(bytes)?,
            utc_offset_minutes: None,
            dst: None,
        })
    }

    fn encode_location(&self, location: &GpsLocation, _zone: Tz) -> Vec<u8> {
        let mut out = Vec::with_capacity(LOCATION_LEN);
        out.extend_from_slice(&location.latitude.to_bits().to_be_bytes());
        out.extend_from_slice(&location.longitude.to_bits().to_be_bytes());
        out.extend_from_slice(&location.altitude.to_bits().to_be_bytes());
        write_date_time(&mut out, &location.timestamp.naive_utc());
        out.push(0x00);
        out
    }

    fn decode_location(&self, bytes: &[u8]) -> CodecResult<DecodedLocation> {
        require_len("location", bytes, LOCATION_LEN)?;
        let timestamp = read_date_time(&bytes[24..31])?.and_utc();
        Ok(DecodedLocation {
            latitude: read_f64_be(bytes, 0),
            longitude: read_f64_be(bytes, 8),
            altitude: Some(read_f64_be(bytes, 16)),
            timestamp,
            utc_offset_minutes: None,
            dst_offset_minutes: None,
        })
    }

    fn encode_geo_tagging_enabled(&self, enabled: bool) -> CodecResult<Vec<u8>> {
        Ok(vec![u8::from(enabled)])
    }

    fn decode_geo_tagging_enabled(&self, bytes: &[u8]) -> CodecResult<bool> {
        require_len("geotagging", bytes, 1)?;
        Ok(bytes[0] != 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CodecError;
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_date_time_layout() {
        let dt = chrono_tz::Asia::Tokyo
            .with_ymd_and_hms(2024, 12, 31, 23, 59, 58)
            .unwrap();
        let bytes = RicohCodec.encode_date_time(&dt);
        assert_eq!(bytes, vec![0xE8, 0x07, 12, 31, 23, 59, 58]);
    }

    #[test]
    fn test_date_time_round_trip() {
        let dt = chrono_tz::Europe::Paris
            .with_ymd_and_hms(2023, 3, 26, 4, 5, 6)
            .unwrap();
        let decoded = RicohCodec
            .decode_date_time(&RicohCodec.encode_date_time(&dt))
            .unwrap();
        assert_eq!(decoded.local, dt.naive_local());
        assert_eq!(decoded.utc_offset_minutes, None);
    }

    #[test]
    fn test_location_layout() {
        let timestamp = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        let fix = GpsLocation::new(1.0, -2.0, 0.5, 3.0, timestamp);
        let bytes = RicohCodec.encode_location(&fix, chrono_tz::UTC);

        assert_eq!(bytes.len(), LOCATION_LEN);
        assert_eq!(&bytes[0..8], &[0x3F, 0xF0, 0, 0, 0, 0, 0, 0]);
        assert_eq!(&bytes[8..16], &[0xC0, 0x00, 0, 0, 0, 0, 0, 0]);
        assert_eq!(&bytes[16..24], &[0x3F, 0xE0, 0, 0, 0, 0, 0, 0]);
        assert_eq!(&bytes[24..31], &[0xE8, 0x07, 1, 2, 3, 4, 5]);
        assert_eq!(bytes[31], 0);
    }

    #[test]
    fn test_location_round_trip_is_bit_exact() {
        let timestamp = Utc.with_ymd_and_hms(2024, 8, 15, 9, 30, 0).unwrap();
        let fix = GpsLocation::new(-33.856784123456, 151.215297987654, 58.123, 5.0, timestamp);
        let decoded = RicohCodec
            .decode_location(&RicohCodec.encode_location(&fix, chrono_tz::UTC))
            .unwrap();

        assert_eq!(decoded.latitude.to_bits(), fix.latitude.to_bits());
        assert_eq!(decoded.longitude.to_bits(), fix.longitude.to_bits());
        assert_eq!(decoded.altitude, Some(fix.altitude));
        assert_eq!(decoded.timestamp, timestamp);
    }

    #[test]
    fn test_short_payloads_are_rejected() {
        assert_eq!(
            RicohCodec.decode_location(&[0u8; 31]),
            Err(CodecError::LengthMismatch {
                packet: "location",
                expected: 32,
                actual: 31
            })
        );
        assert!(matches!(
            RicohCodec.decode_date_time(&[0xE8, 0x07, 1]),
            Err(CodecError::LengthMismatch { .. })
        ));
        assert!(RicohCodec.decode_geo_tagging_enabled(&[]).is_err());
    }

    #[test]
    fn test_invalid_calendar_fields() {
        let bytes = [0xE8, 0x07, 13, 1, 0, 0, 0];
        assert!(matches!(
            RicohCodec.decode_date_time(&bytes),
            Err(CodecError::FieldOutOfRange { .. })
        ));
    }

    #[test]
    fn test_geo_tagging_toggle() {
        assert_eq!(RicohCodec.encode_geo_tagging_enabled(true).unwrap(), vec![1]);
        assert_eq!(RicohCodec.encode_geo_tagging_enabled(false).unwrap(), vec![0]);
        assert!(RicohCodec.decode_geo_tagging_enabled(&[1]).unwrap());
        assert!(!RicohCodec.decode_geo_tagging_enabled(&[0]).unwrap());
    }
}
