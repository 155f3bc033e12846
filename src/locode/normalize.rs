//! Normalization of decoded lines into geocoded location records.
//!
//! Normalization is total: unparseable coordinates become `(0.0, 0.0)` and an
//! unrecognised function code clears every category flag. The record is
//! always produced.

use super::parser::RawRecord;

const LATITUDE_RANGE: std::ops::RangeInclusive<f64> = -90.0..=90.0;
const LONGITUDE_RANGE: std::ops::RangeInclusive<f64> = -180.0..=180.0;

/// Canonical location record, ready for bulk loading.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedRecord {
    /// Country code followed by location code, e.g. `DEHAM`.
    pub unlocode: String,
    pub name: String,
    pub country_code: String,
    pub latitude: f64,
    pub longitude: f64,
    pub is_airport: bool,
    pub is_port: bool,
    pub is_train_station: bool,
}

impl NormalizedRecord {
    pub fn coordinates_in_range(&self) -> bool {
        LATITUDE_RANGE.contains(&self.latitude) && LONGITUDE_RANGE.contains(&self.longitude)
    }
}

/// Transport categories encoded in the function classifier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FunctionFlags {
    pub is_port: bool,
    pub is_train_station: bool,
    pub is_airport: bool,
}

pub fn normalize(raw: RawRecord) -> NormalizedRecord {
    normalize_with_coordinate_check(raw).0
}

/// Like [`normalize`], also returning whether the coordinates were parsed.
///
/// `false` means the record carries the `(0.0, 0.0)` fallback, which a real
/// `0000N 00000E` entry does not.
pub fn normalize_with_coordinate_check(raw: RawRecord) -> (NormalizedRecord, bool) {
    let parsed = parse_coordinates(&raw.coordinates);
    let (latitude, longitude) = parsed.unwrap_or((0.0, 0.0));
    let flags = parse_function_code(&raw.function_code);

    let country_code = raw.country_code.to_ascii_uppercase();
    let unlocode = format!("{}{}", country_code, raw.location_code.to_ascii_uppercase());

    let record = NormalizedRecord {
        unlocode,
        name: raw.name,
        country_code,
        latitude,
        longitude,
        is_airport: flags.is_airport,
        is_port: flags.is_port,
        is_train_station: flags.is_train_station,
    };
    (record, parsed.is_some())
}

/// Parse `DDMM[N|S] DDDMM[E|W]` into signed decimal degrees.
///
/// Returns `None` for anything malformed or outside the WGS84 ranges.
pub fn parse_coordinates(value: &str) -> Option<(f64, f64)> {
    let mut parts = value.split_whitespace();
    let lat_part = parts.next()?;
    let lon_part = parts.next()?;
    if parts.next().is_some() {
        return None;
    }

    let latitude = parse_angle(lat_part, 2, 'N', 'S')?;
    let longitude = parse_angle(lon_part, 3, 'E', 'W')?;

    if !LATITUDE_RANGE.contains(&latitude) || !LONGITUDE_RANGE.contains(&longitude) {
        return None;
    }

    Some((latitude, longitude))
}

fn parse_angle(part: &str, degree_digits: usize, positive: char, negative: char) -> Option<f64> {
    if !part.is_ascii() || part.len() != degree_digits + 3 {
        return None;
    }

    let (digits, hemisphere) = part.split_at(degree_digits + 2);
    if !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    let degrees: u32 = digits[..degree_digits].parse().ok()?;
    let minutes: u32 = digits[degree_digits..].parse().ok()?;
    if minutes >= 60 {
        return None;
    }

    let magnitude = f64::from(degrees) + f64::from(minutes) / 60.0;
    match hemisphere.chars().next()?.to_ascii_uppercase() {
        c if c == positive => Some(magnitude),
        c if c == negative => Some(-magnitude),
        _ => None,
    }
}

/// Read the positional function classifier (`1` port, `2` rail, `4` airport).
///
/// Only the first 8 characters are read; shorter codes set no flags.
pub fn parse_function_code(code: &str) -> FunctionFlags {
    let bytes = code.as_bytes();
    if bytes.len() < 8 {
        return FunctionFlags::default();
    }

    FunctionFlags {
        is_port: bytes[0] == b'1',
        is_train_station: bytes[1] == b'2',
        is_airport: bytes[3] == b'4',
    }
}
