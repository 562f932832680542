use super::import::PlateImport;
use std::error::Error;
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::Path;

/// Defines the interface for reading and writing plate data formats.
///
/// Implementors convert between a concrete file layout and the canonical
/// [`PlateImport`] shape accepted by the analysis engine.
pub trait PlateFile {
    /// The error type for I/O operations.
    type Error: Error + From<io::Error>;

    /// Reads plate data from a buffered reader.
    ///
    /// # Errors
    ///
    /// Returns an error if parsing fails or I/O operations encounter issues.
    fn read_from(reader: &mut impl BufRead) -> Result<PlateImport, Self::Error>;

    /// Writes plate data to a writer.
    ///
    /// # Errors
    ///
    /// Returns an error if the data cannot be represented in this format or
    /// writing fails.
    fn write_to(plate: &PlateImport, writer: &mut impl Write) -> Result<(), Self::Error>;

    /// Reads plate data from a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or parsing fails.
    fn read_from_path<P: AsRef<Path>>(path: P) -> Result<PlateImport, Self::Error> {
        let file = File::open(path)?;
        let mut reader = BufReader::new(file);
        Self::read_from(&mut reader)
    }

    /// Writes plate data to a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be created or writing fails.
    fn write_to_path<P: AsRef<Path>>(plate: &PlateImport, path: P) -> Result<(), Self::Error> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        Self::write_to(plate, &mut writer)?;
        writer.flush()?;
        Ok(())
    }
}
