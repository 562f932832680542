use crate::core::models::results::Table;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

/// Formats a value for tabular output; missing values are written as `NaN`.
fn format_value(value: f64) -> String {
    if value.is_nan() {
        "NaN".to_string()
    } else {
        value.to_string()
    }
}

pub fn write_table(table: &Table, writer: impl Write) -> Result<(), csv::Error> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    csv_writer.write_record(table.key_columns.iter().chain(&table.value_columns))?;
    for row in &table.rows {
        let record: Vec<String> = row
            .keys
            .iter()
            .cloned()
            .chain(row.values.iter().map(|v| format_value(*v)))
            .collect();
        csv_writer.write_record(&record)?;
    }
    csv_writer.flush()?;
    Ok(())
}

pub fn write_table_to_path<P: AsRef<Path>>(table: &Table, path: P) -> Result<(), csv::Error> {
    let file = File::create(path).map_err(csv::Error::from)?;
    write_table(table, BufWriter::new(file))
}

/// Writes the table as CSV into a string, mostly for previews and tests.
pub fn table_to_string(table: &Table) -> io::Result<String> {
    let mut buffer = Vec::new();
    write_table(table, &mut buffer).map_err(io::Error::other)?;
    String::from_utf8(buffer).map_err(io::Error::other)
}
