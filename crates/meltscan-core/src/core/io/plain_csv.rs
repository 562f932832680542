//! Plain CSV plate exports: a `Temperature` column followed by one column per
//! well (`A1` ... `H12`), holding a single readout.

use super::error::LoadError;
use super::import::{PlateImport, ReadoutMatrix};
use super::traits::PlateFile;
use crate::core::models::dataset::DEFAULT_SCAN_RATE;
use crate::core::models::well::WellId;
use std::collections::BTreeMap;
use std::io::{BufRead, Read, Write};

pub const DEFAULT_READOUT: &str = "Signal";
pub const CELSIUS_OFFSET: f64 = 273.15;

/// Any axis whose maximum lies below this value is taken to be in °C.
const AUTO_CELSIUS_LIMIT: f64 = 200.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TemperatureUnit {
    Celsius,
    Kelvin,
    #[default]
    Auto,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlainCsvOptions {
    pub readout: String,
    pub unit: TemperatureUnit,
    pub scan_rate: f64,
}

impl Default for PlainCsvOptions {
    fn default() -> Self {
        Self {
            readout: DEFAULT_READOUT.to_string(),
            unit: TemperatureUnit::Auto,
            scan_rate: DEFAULT_SCAN_RATE,
        }
    }
}

pub struct PlainCsv;

impl PlainCsv {
    pub fn read_with(reader: impl Read, options: &PlainCsvOptions) -> Result<PlateImport, LoadError> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(reader);

        let headers = csv_reader.headers()?.clone();
        let mut columns = headers.iter();
        match columns.next() {
            Some(first) if first.eq_ignore_ascii_case("temperature") => {}
            other => {
                return Err(LoadError::Malformed {
                    line: 1,
                    message: format!(
                        "first column must be 'Temperature', found '{}'",
                        other.unwrap_or_default()
                    ),
                });
            }
        }

        let mut wells = Vec::with_capacity(headers.len().saturating_sub(1));
        for name in columns {
            let well: WellId = name.parse().map_err(|_| LoadError::Malformed {
                line: 1,
                message: format!("column '{}' is not a well identifier", name),
            })?;
            if wells.contains(&well) {
                return Err(LoadError::Duplicate {
                    kind: "well column",
                    name: well.to_string(),
                });
            }
            wells.push(well);
        }
        if wells.is_empty() {
            return Err(LoadError::Empty("well columns"));
        }

        let mut temperature = Vec::new();
        let mut signals: Vec<Vec<f64>> = vec![Vec::new(); wells.len()];
        for record in csv_reader.records() {
            let record = record?;
            let line = record.position().map_or(0, |p| p.line() as usize);
            let mut fields = record.iter().map(|field| {
                field.parse::<f64>().map_err(|_| LoadError::Malformed {
                    line,
                    message: format!("'{}' is not a number", field),
                })
            });
            let Some(t) = fields.next() else {
                continue;
            };
            temperature.push(t?);
            for (column, value) in signals.iter_mut().zip(fields) {
                column.push(value?);
            }
        }
        if temperature.is_empty() {
            return Err(LoadError::Empty("data rows"));
        }

        let in_celsius = match options.unit {
            TemperatureUnit::Celsius => true,
            TemperatureUnit::Kelvin => false,
            TemperatureUnit::Auto => temperature
                .iter()
                .all(|t| *t < AUTO_CELSIUS_LIMIT),
        };
        if in_celsius {
            temperature.iter_mut().for_each(|t| *t += CELSIUS_OFFSET);
        }

        let readout = ReadoutMatrix {
            name: options.readout.clone(),
            temperature,
            signals: wells.into_iter().zip(signals).collect::<BTreeMap<_, _>>(),
        };
        Ok(PlateImport::new(vec![readout]).with_scan_rate(options.scan_rate))
    }
}

impl PlateFile for PlainCsv {
    type Error = LoadError;

    fn read_from(reader: &mut impl BufRead) -> Result<PlateImport, Self::Error> {
        Self::read_with(reader, &PlainCsvOptions::default())
    }

    /// Writes the only readout of `plate`, with temperatures in °C.
    fn write_to(plate: &PlateImport, writer: &mut impl Write) -> Result<(), Self::Error> {
        let [readout] = plate.readouts.as_slice() else {
            return Err(LoadError::Metadata(format!(
                "plain CSV holds exactly one readout, got {}",
                plate.readouts.len()
            )));
        };
        let mut csv_writer = csv::Writer::from_writer(writer);
        let mut header = vec!["Temperature".to_string()];
        header.extend(readout.signals.keys().map(WellId::to_string));
        csv_writer.write_record(&header)?;
        for (i, t) in readout.temperature.iter().enumerate() {
            let mut row = vec![(t - CELSIUS_OFFSET).to_string()];
            row.extend(readout.signals.values().map(|s| s[i].to_string()));
            csv_writer.write_record(&row)?;
        }
        csv_writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn id(s: &str) -> WellId {
        s.parse().unwrap()
    }

    #[test]
    fn reads_celsius_file_into_kelvin() {
        let text = "Temperature,A1,B12\n25.0,1.0,2.0\n26.0,1.5,2.5\n";
        let plate = PlainCsv::read_from(&mut Cursor::new(text)).unwrap();
        assert_eq!(plate.readouts.len(), 1);
        let readout = &plate.readouts[0];
        assert_eq!(readout.name, DEFAULT_READOUT);
        assert!((readout.temperature[0] - 298.15).abs() < 1e-9);
        assert_eq!(readout.signals[&id("B12")], vec![2.0, 2.5]);
        assert_eq!(plate.scan_rate, DEFAULT_SCAN_RATE);
    }

    #[test]
    fn kelvin_axis_is_left_untouched() {
        let text = "Temperature,A1\n300,1\n301,2\n";
        let plate = PlainCsv::read_from(&mut Cursor::new(text)).unwrap();
        assert_eq!(plate.readouts[0].temperature, vec![300.0, 301.0]);
    }

    #[test]
    fn explicit_options_override_detection() {
        let options = PlainCsvOptions {
            readout: "Ratio".into(),
            unit: TemperatureUnit::Kelvin,
            scan_rate: 2.0,
        };
        let plate = PlainCsv::read_with("Temperature,A1\n30,1\n31,2\n".as_bytes(), &options).unwrap();
        assert_eq!(plate.readouts[0].name, "Ratio");
        assert_eq!(plate.readouts[0].temperature, vec![30.0, 31.0]);
        assert_eq!(plate.scan_rate, 2.0);
    }

    #[test]
    fn rejects_bad_headers_and_values() {
        assert!(matches!(
            PlainCsv::read_from(&mut Cursor::new("Time,A1\n1,2\n")),
            Err(LoadError::Malformed { line: 1, .. })
        ));
        assert!(matches!(
            PlainCsv::read_from(&mut Cursor::new("Temperature,Z9\n1,2\n")),
            Err(LoadError::Malformed { .. })
        ));
        assert!(matches!(
            PlainCsv::read_from(&mut Cursor::new("Temperature,A1,A1\n1,2,3\n")),
            Err(LoadError::Duplicate { .. })
        ));
        assert!(matches!(
            PlainCsv::read_from(&mut Cursor::new("Temperature,A1\n1,abc\n")),
            Err(LoadError::Malformed { .. })
        ));
        assert!(matches!(
            PlainCsv::read_from(&mut Cursor::new("Temperature,A1\n")),
            Err(LoadError::Empty(_))
        ));
    }

    #[test]
    fn ragged_rows_are_reported_by_the_csv_reader() {
        assert!(matches!(
            PlainCsv::read_from(&mut Cursor::new("Temperature,A1,A2\n1,2\n")),
            Err(LoadError::Csv(_))
        ));
    }

    #[test]
    fn written_file_reads_back() {
        let text = "Temperature,A1,A2\n25,1,2\n26,3,4\n";
        let plate = PlainCsv::read_from(&mut Cursor::new(text)).unwrap();
        let mut out = Vec::new();
        PlainCsv::write_to(&plate, &mut out).unwrap();
        let again = PlainCsv::read_from(&mut Cursor::new(out)).unwrap();
        assert_eq!(again.readouts[0].signals, plate.readouts[0].signals);
        for (a, b) in again.readouts[0]
            .temperature
            .iter()
            .zip(&plate.readouts[0].temperature)
        {
            assert!((a - b).abs() < 1e-9);
        }
    }
}
