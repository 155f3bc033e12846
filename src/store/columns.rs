//! Columnar layout of a batch for `UNNEST` bulk inserts.

use crate::locode::NormalizedRecord;

/// Prepared location data for bulk insertion.
///
/// All vectors have the same length; each index is one row.
#[derive(Debug, Default)]
pub struct LocationColumns {
    pub unlocodes: Vec<String>,
    pub names: Vec<String>,
    pub country_codes: Vec<String>,
    pub latitudes: Vec<f64>,
    pub longitudes: Vec<f64>,
    pub is_airport: Vec<bool>,
    pub is_port: Vec<bool>,
    pub is_train_station: Vec<bool>,
    /// Records left out because they would not produce a valid row.
    pub rejected: usize,
}

impl LocationColumns {
    /// Build columns from `records`, leaving out rows with an empty name or
    /// coordinates outside the WGS84 ranges.
    pub fn from_records(records: &[NormalizedRecord]) -> Self {
        let mut columns = Self::with_capacity(records.len());

        for record in records {
            if record.name.trim().is_empty() || !record.coordinates_in_range() {
                columns.rejected += 1;
                continue;
            }

            columns.unlocodes.push(record.unlocode.clone());
            columns.names.push(record.name.clone());
            columns.country_codes.push(record.country_code.clone());
            columns.latitudes.push(record.latitude);
            columns.longitudes.push(record.longitude);
            columns.is_airport.push(record.is_airport);
            columns.is_port.push(record.is_port);
            columns.is_train_station.push(record.is_train_station);
        }

        if columns.rejected > 0 {
            log::debug!(
                "excluded {} of {} records from bulk insert",
                columns.rejected,
                records.len()
            );
        }

        columns
    }

    fn with_capacity(capacity: usize) -> Self {
        Self {
            unlocodes: Vec::with_capacity(capacity),
            names: Vec::with_capacity(capacity),
            country_codes: Vec::with_capacity(capacity),
            latitudes: Vec::with_capacity(capacity),
            longitudes: Vec::with_capacity(capacity),
            is_airport: Vec::with_capacity(capacity),
            is_port: Vec::with_capacity(capacity),
            is_train_station: Vec::with_capacity(capacity),
            rejected: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.unlocodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.unlocodes.is_empty()
    }
}
