//! Layout files: two columns, `ID` and `Condition`, one row per well.

use super::error::LoadError;
use crate::core::models::layout::Layout;
use crate::core::models::well::WellId;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, Read, Write};
use std::path::Path;

pub fn read_layout(reader: impl Read) -> Result<Layout, LoadError> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);
    let headers = csv_reader.headers()?.clone();
    let position = |name: &str| {
        headers
            .iter()
            .position(|h| h.eq_ignore_ascii_case(name))
            .ok_or_else(|| LoadError::Malformed {
                line: 1,
                message: format!("missing '{}' column", name),
            })
    };
    let id_column = position("ID")?;
    let condition_column = position("Condition")?;

    let mut labels = BTreeMap::new();
    for record in csv_reader.records() {
        let record = record?;
        let line = record.position().map_or(0, |p| p.line() as usize);
        let raw_id = record.get(id_column).unwrap_or_default();
        let well: WellId = raw_id.parse().map_err(|_| LoadError::Malformed {
            line,
            message: format!("'{}' is not a well identifier", raw_id),
        })?;
        let condition = record.get(condition_column).unwrap_or_default().to_string();
        if labels.insert(well, condition).is_some() {
            return Err(LoadError::Duplicate {
                kind: "layout well",
                name: well.to_string(),
            });
        }
    }
    Ok(Layout::from_labels(labels))
}

pub fn read_layout_from_path<P: AsRef<Path>>(path: P) -> Result<Layout, LoadError> {
    read_layout(BufReader::new(File::open(path)?))
}

/// Writes all 96 positions, leaving unlabeled wells empty.
pub fn write_layout(layout: &Layout, writer: impl Write) -> Result<(), LoadError> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    csv_writer.write_record(["ID", "Condition"])?;
    for well in WellId::all() {
        csv_writer.write_record([
            well.to_string().as_str(),
            layout.condition(well).unwrap_or_default(),
        ])?;
    }
    csv_writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> WellId {
        s.parse().unwrap()
    }

    #[test]
    fn reads_layout_with_columns_in_any_order() {
        let text = "Condition,ID\nbuffer,A1\n,A2\n\"NaCl, 50 mM\",B3\n";
        let layout = read_layout(text.as_bytes()).unwrap();
        assert_eq!(layout.condition(id("A1")), Some("buffer"));
        assert_eq!(layout.condition(id("A2")), None);
        assert_eq!(layout.condition(id("B3")), Some("NaCl, 50 mM"));
        assert!(!layout.is_modified());
    }

    #[test]
    fn rejects_missing_columns_and_duplicates() {
        assert!(matches!(
            read_layout("Well,Condition\nA1,x\n".as_bytes()),
            Err(LoadError::Malformed { line: 1, .. })
        ));
        assert!(matches!(
            read_layout("ID,Condition\nA1,x\nA1,y\n".as_bytes()),
            Err(LoadError::Duplicate { .. })
        ));
    }

    #[test]
    fn written_layout_lists_every_well_and_reads_back() {
        let layout = Layout::from_labels([(id("C7"), "ligand")]);
        let mut out = Vec::new();
        write_layout(&layout, &mut out).unwrap();
        let text = String::from_utf8(out.clone()).unwrap();
        assert_eq!(text.lines().count(), 97);
        assert_eq!(read_layout(out.as_slice()).unwrap(), layout);
    }

    #[test]
    fn reads_from_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("layout.csv");
        std::fs::write(&path, "ID,Condition\nH12,control\n").unwrap();
        let layout = read_layout_from_path(&path).unwrap();
        assert_eq!(layout.condition(id("H12")), Some("control"));
        assert!(read_layout_from_path(dir.path().join("missing.csv")).is_err());
    }
}
