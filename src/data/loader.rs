//! Flight schedule loading
//!
//! Reads the upstream schedule CSV into [`FlightRecord`]s. Timestamps are
//! kept as text and parsed by the feature extractors.

use std::collections::BTreeSet;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use crate::{columns, DelayError, FlightRecord, Result};

/// Load every record of a schedule CSV file
pub fn load_records<P: AsRef<Path>>(path: P) -> Result<Vec<FlightRecord>> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| {
        DelayError::Config(format!("Failed to open dataset {}: {}", path.display(), e))
    })?;
    let records = read_records(file)?;
    log::info!("Loaded {} flight records from {}", records.len(), path.display());
    Ok(records)
}

/// Read schedule records from any CSV source with a header row
///
/// Every column is kept: the known schedule columns fill their fields and
/// the rest land in [`FlightRecord::extra`].
pub fn read_records<R: Read>(reader: R) -> Result<Vec<FlightRecord>> {
    let mut reader = csv::Reader::from_reader(reader);
    let headers = reader.headers()?.clone();

    reader
        .records()
        .map(|row| {
            let row = row?;
            FlightRecord::from_columns(headers.iter().zip(row.iter()))
        })
        .collect()
}

/// Write records back out as CSV
///
/// The header is the known schedule columns present in any record,
/// followed by every extra column in name order.
pub fn save_records<P: AsRef<Path>>(records: &[FlightRecord], path: P) -> Result<()> {
    let mut header: Vec<&str> = KNOWN_COLUMNS
        .iter()
        .copied()
        .filter(|column| records.iter().any(|r| r.cell(column).is_some()))
        .collect();
    let extra: BTreeSet<&str> = records
        .iter()
        .flat_map(|r| r.extra.keys().map(String::as_str))
        .collect();
    header.extend(extra);

    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(&header)?;
    for record in records {
        writer.write_record(
            header
                .iter()
                .map(|column| record.cell(column).unwrap_or_default()),
        )?;
    }
    writer.flush()?;
    Ok(())
}

const KNOWN_COLUMNS: [&str; 7] = [
    columns::SCHEDULED,
    columns::ACTUAL,
    columns::ORIGIN,
    columns::DESTINATION,
    columns::CARRIER,
    columns::FLIGHT_TYPE,
    columns::CONCURRENT_FLIGHTS,
];

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
Fecha-I,Vlo-I,Ori-I,Des-I,Emp-I,Fecha-O,Vlo-O,TIPOVUELO,OPERA
2017-01-01 23:30:00,226,SCEL,KMIA,AAL,2017-01-01 23:33:00,226,I,American Airlines
2017-01-02 23:30:00,226,SCEL,KMIA,AAL,2017-01-02 23:39:00,226,I,American Airlines
";

    #[test]
    fn test_read_keeps_extra_columns() {
        let records = read_records(SAMPLE.as_bytes()).unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].scheduled, "2017-01-01 23:30:00");
        assert_eq!(records[0].actual.as_deref(), Some("2017-01-01 23:33:00"));
        assert_eq!(records[1].flight_type.as_deref(), Some("I"));
        assert_eq!(records[1].concurrent_flights, None);
        assert_eq!(records[0].cell("OPERA").as_deref(), Some("American Airlines"));
        assert_eq!(records[0].cell("Vlo-I").as_deref(), Some("226"));
    }

    #[test]
    fn test_sparse_columns_are_absent() {
        let csv = "Fecha-I,Emp-I\n2017-01-01 23:30:00,\n";
        let records = read_records(csv.as_bytes()).unwrap();
        assert_eq!(records[0].carrier, None);
        assert_eq!(records[0].origin, None);
    }

    #[test]
    fn test_missing_schedule_column() {
        let csv = "Ori-I,Des-I\nSCEL,KMIA\n";
        let err = read_records(csv.as_bytes()).unwrap_err();
        assert!(matches!(
            err,
            DelayError::SchemaMismatch { ref column, .. } if column == "Fecha-I"
        ));
    }

    #[test]
    fn test_save_and_load() {
        let records = read_records(SAMPLE.as_bytes()).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("flights.csv");

        save_records(&records, &path).unwrap();
        let loaded = load_records(&path).unwrap();

        assert_eq!(loaded, records);
    }
}
