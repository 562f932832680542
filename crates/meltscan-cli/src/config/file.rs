use crate::error::{CliError, Result};
use serde::Deserialize;
use std::path::Path;
use tracing::debug;

#[derive(Deserialize, Debug, Default, Clone, PartialEq)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct FileConfig {
    pub import: Option<FileImportConfig>,
    pub preprocessing: Option<FilePreprocessingConfig>,
    pub analysis: Option<FileAnalysisConfig>,
    pub fitting: Option<FileFittingConfig>,
    pub export: Option<FileExportConfig>,
}

#[derive(Deserialize, Debug, Default, Clone, PartialEq)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct FileImportConfig {
    pub readout: Option<String>,
    pub unit: Option<String>,
    pub scan_rate: Option<f64>,
}

#[derive(Deserialize, Debug, Default, Clone, PartialEq)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct FilePreprocessingConfig {
    /// Explicit stage list; must follow the canonical order.
    pub stages: Option<Vec<String>>,
    pub exclude: Option<Vec<String>>,
    pub blanks: Option<Vec<String>>,
    pub invert: Option<bool>,
    pub trim_min: Option<f64>,
    pub trim_max: Option<f64>,
    pub median_filter: Option<usize>,
    pub shrink: Option<f64>,
    pub savgol: Option<usize>,
}

#[derive(Deserialize, Debug, Default, Clone, PartialEq)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct FileAnalysisConfig {
    pub model: Option<String>,
    pub dcp: Option<f64>,
    pub baseline_degree: Option<usize>,
    pub baseline_fraction: Option<f64>,
    pub baseline_points: Option<usize>,
    pub onset_threshold: Option<f64>,
    pub aggregation_threshold: Option<f64>,
    pub scoring: Option<String>,
}

#[derive(Deserialize, Debug, Default, Clone, PartialEq)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct FileFittingConfig {
    pub max_iterations: Option<usize>,
    pub ftol: Option<f64>,
    pub xtol: Option<f64>,
    pub reference_temperature: Option<f64>,
}

#[derive(Deserialize, Debug, Default, Clone, PartialEq)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct FileExportConfig {
    pub report: Option<String>,
    pub session: Option<bool>,
    pub metrics: Option<Vec<String>>,
    pub min_score: Option<f64>,
    pub merge_duplicates: Option<bool>,
}

impl FileConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        debug!("Loading configuration from file: {:?}", path);
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content).map_err(|e| CliError::parsing(path, e))
    }

    pub fn from_toml(content: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_every_table() {
        let config = FileConfig::from_toml(
            r#"
            [import]
            readout = "Ratio"
            unit = "celsius"
            scan-rate = 2.0

            [preprocessing]
            stages = ["blank", "exclude", "trim", "derivative"]
            exclude = ["A1", "H12"]
            trim-min = 300.0
            savgol = 7

            [analysis]
            model = "lumry_eyring"
            baseline-fraction = 0.2
            scoring = "normalized-rmse"

            [fitting]
            max-iterations = 500

            [export]
            report = "html"
            session = true
            metrics = ["Tm_fit", "S"]
            "#,
        )
        .unwrap();

        assert_eq!(config.import.unwrap().scan_rate, Some(2.0));
        let prep = config.preprocessing.unwrap();
        assert_eq!(prep.exclude.unwrap(), vec!["A1", "H12"]);
        assert_eq!(prep.savgol, Some(7));
        assert_eq!(config.analysis.unwrap().model.as_deref(), Some("lumry_eyring"));
        assert_eq!(config.fitting.unwrap().max_iterations, Some(500));
        assert_eq!(config.export.unwrap().session, Some(true));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(FileConfig::from_toml("[analysis]\nmodle = \"irrev\"\n").is_err());
        assert!(FileConfig::from_toml("[plotting]\ndpi = 300\n").is_err());
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let result = FileConfig::from_file(Path::new("/nonexistent/meltscan.toml"));
        assert!(matches!(result, Err(CliError::Io(_))));
    }
}
