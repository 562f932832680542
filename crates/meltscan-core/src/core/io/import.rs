use crate::core::models::dataset::DEFAULT_SCAN_RATE;
use crate::core::models::well::WellId;
use std::collections::BTreeMap;

/// One readout of a plate as delivered by an import adapter: a shared
/// temperature axis (kelvin) and one signal vector per well.
#[derive(Debug, Clone, PartialEq)]
pub struct ReadoutMatrix {
    pub name: String,
    pub temperature: Vec<f64>,
    pub signals: BTreeMap<WellId, Vec<f64>>,
}

/// The canonical shape every import adapter produces.
#[derive(Debug, Clone, PartialEq)]
pub struct PlateImport {
    pub readouts: Vec<ReadoutMatrix>,
    pub layout: BTreeMap<WellId, String>,
    /// Heating rate in K/min.
    pub scan_rate: f64,
}

impl PlateImport {
    pub fn new(readouts: Vec<ReadoutMatrix>) -> Self {
        Self {
            readouts,
            layout: BTreeMap::new(),
            scan_rate: DEFAULT_SCAN_RATE,
        }
    }

    pub fn with_layout(mut self, layout: BTreeMap<WellId, String>) -> Self {
        self.layout = layout;
        self
    }

    pub fn with_scan_rate(mut self, scan_rate: f64) -> Self {
        self.scan_rate = scan_rate;
        self
    }
}
