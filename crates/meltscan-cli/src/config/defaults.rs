use meltscan::core::io::plain_csv::DEFAULT_READOUT;
use meltscan::engine::config::FitConfig;

/// Values used when neither the command line nor the config file sets them.
pub struct DefaultsConfig {
    pub readout: String,
    pub unit: String,
    pub fit: FitConfig,
    pub session: bool,
    pub merge_duplicates: bool,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            readout: DEFAULT_READOUT.to_string(),
            unit: "auto".to_string(),
            fit: FitConfig::default(),
            session: false,
            merge_duplicates: false,
        }
    }
}
