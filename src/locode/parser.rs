//! Decoding of UN/LOCODE code-list lines.
//!
//! The published code list is a headerless or single-header CSV with twelve
//! columns:
//!
//! `Change, Country, Location, Name, NameWoDiacritics, Subdivision, Status,
//! Function, Date, IATA, Coordinates, Remarks`
//!
//! Field splitting is delegated to the `csv` crate so quoted names containing
//! commas survive intact. Each field is decoded as UTF-8 and falls back to
//! Latin-1 when the bytes are not valid UTF-8, which is how older releases of
//! the list are encoded.
//!
//! Every line is split on its own. A quote left open on one line is a
//! [`DecodeError::UnbalancedQuote`] for that line and never swallows the
//! lines after it.
//!
//! Decoding never panics and never aborts a run: a line that cannot be
//! decoded returns a [`DecodeError`] and the caller skips it.

use csv::{ByteRecord, ReaderBuilder};
use thiserror::Error;

/// Country, location and name are the minimum a usable line carries.
const MIN_FIELDS: usize = 4;

mod column {
    pub const CHANGE: usize = 0;
    pub const COUNTRY: usize = 1;
    pub const LOCATION: usize = 2;
    pub const NAME: usize = 3;
    pub const NAME_WO_DIACRITICS: usize = 4;
    pub const SUBDIVISION: usize = 5;
    pub const STATUS: usize = 6;
    pub const FUNCTION: usize = 7;
    pub const DATE: usize = 8;
    pub const IATA: usize = 9;
    pub const COORDINATES: usize = 10;
    pub const REMARKS: usize = 11;
}

/// Errors that cause a single line to be skipped.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("empty line")]
    Empty,
    #[error("expected at least {MIN_FIELDS} fields, found {found}")]
    TooFewFields { found: usize },
    #[error("country row {country} has no location code")]
    MissingLocationCode { country: String },
    #[error("invalid country code `{0}`")]
    InvalidCountryCode(String),
    #[error("invalid location code `{0}`")]
    InvalidLocationCode(String),
    #[error("unbalanced quote")]
    UnbalancedQuote,
    #[error("malformed CSV: {0}")]
    Csv(#[from] csv::Error),
}

/// Fields of one code-list line, verbatim apart from trimming.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawRecord {
    pub change: String,
    pub country_code: String,
    pub location_code: String,
    pub name: String,
    pub name_without_diacritics: String,
    pub subdivision: String,
    pub status: String,
    pub function_code: String,
    pub date: String,
    pub iata: String,
    pub coordinates: String,
    pub remarks: String,
}

impl RawRecord {
    /// Decode one text line of the code list.
    pub fn decode(line: &str) -> Result<Self, DecodeError> {
        Self::decode_bytes(line.as_bytes())
    }

    /// Decode one raw line, with or without its line terminator.
    pub fn decode_bytes(line: &[u8]) -> Result<Self, DecodeError> {
        let line = line.strip_suffix(b"\n").unwrap_or(line);
        let line = line.strip_suffix(b"\r").unwrap_or(line);

        // Escaped quotes come in pairs, so an odd count means a field never closed
        if line.iter().filter(|&&b| b == b'"').count() % 2 == 1 {
            return Err(DecodeError::UnbalancedQuote);
        }

        let mut reader = ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(line);

        let mut record = ByteRecord::new();
        if !reader.read_byte_record(&mut record)? {
            return Err(DecodeError::Empty);
        }

        Self::from_record(&record)
    }

    /// Decode a record already split into fields.
    pub fn from_record(record: &ByteRecord) -> Result<Self, DecodeError> {
        if record.len() < MIN_FIELDS {
            if record.iter().all(|field| field.iter().all(u8::is_ascii_whitespace)) {
                return Err(DecodeError::Empty);
            }
            return Err(DecodeError::TooFewFields {
                found: record.len(),
            });
        }

        let field = |index: usize| record.get(index).map(decode_field).unwrap_or_default();

        let country_code = field(column::COUNTRY);
        let location_code = field(column::LOCATION);

        if country_code.len() != 2 || !country_code.bytes().all(|b| b.is_ascii_alphabetic()) {
            return Err(DecodeError::InvalidCountryCode(country_code));
        }
        if location_code.is_empty() {
            return Err(DecodeError::MissingLocationCode {
                country: country_code,
            });
        }
        if location_code.len() != 3 || !location_code.bytes().all(|b| b.is_ascii_alphanumeric()) {
            return Err(DecodeError::InvalidLocationCode(location_code));
        }

        Ok(Self {
            change: field(column::CHANGE),
            country_code,
            location_code,
            name: field(column::NAME),
            name_without_diacritics: field(column::NAME_WO_DIACRITICS),
            subdivision: field(column::SUBDIVISION),
            status: field(column::STATUS),
            function_code: field(column::FUNCTION),
            date: field(column::DATE),
            iata: field(column::IATA),
            coordinates: field(column::COORDINATES),
            remarks: field(column::REMARKS),
        })
    }
}

/// UTF-8 when valid, otherwise Latin-1 (every byte maps to one code point).
fn decode_field(bytes: &[u8]) -> String {
    let text = match std::str::from_utf8(bytes) {
        Ok(text) => text.to_owned(),
        Err(_) => bytes.iter().map(|&b| b as char).collect(),
    };
    text.trim().to_string()
}
