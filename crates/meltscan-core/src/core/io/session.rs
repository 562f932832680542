//! Versioned, self-contained session documents.
//!
//! A session carries raw curves, the layout, every setting, the engine setup
//! (pipeline stages, optimizer limits, scoring) and the computed results. The format tag and version are checked before the body is decoded,
//! and the decoded body is validated before it is handed out, so a failed load
//! never yields a partially restored state.

use super::error::SchemaError;
use crate::core::fitting::lm::LmConfig;
use crate::core::fitting::registry::STANDARD_TEMPERATURE;
use crate::core::fitting::score::ScoringConfig;
use crate::core::models::dataset::Dataset;
use crate::core::models::layout::Layout;
use crate::core::models::results::ResultSchema;
use crate::core::models::well::WellId;
use crate::core::preprocessing::{PreprocessingPipeline, Stage};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeSet, HashSet};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

pub const SESSION_FORMAT: &str = "meltscan-session";
pub const SESSION_VERSION: u64 = 1;

/// Manager-wide analysis setup shared by every dataset of a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisSetup {
    pub stages: Vec<Stage>,
    pub max_iterations: usize,
    pub ftol: f64,
    pub xtol: f64,
    pub reference_temperature: f64,
    /// `None` when the manager used a strategy that cannot be persisted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scoring: Option<ScoringConfig>,
}

impl Default for AnalysisSetup {
    fn default() -> Self {
        let lm = LmConfig::default();
        Self {
            stages: Stage::CANONICAL.to_vec(),
            max_iterations: lm.max_iterations,
            ftol: lm.ftol,
            xtol: lm.xtol,
            reference_temperature: STANDARD_TEMPERATURE,
            scoring: Some(ScoringConfig::RSquared),
        }
    }
}

/// The state persisted in a session document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionBody {
    pub layout: Layout,
    pub schema: ResultSchema,
    pub setup: AnalysisSetup,
    pub datasets: Vec<Dataset>,
}

#[derive(Serialize)]
struct DocumentRef<'a> {
    format: &'static str,
    version: u64,
    generator: String,
    layout: &'a Layout,
    schema: ResultSchema,
    setup: &'a AnalysisSetup,
    datasets: &'a [Dataset],
}

#[derive(Deserialize)]
struct Document {
    layout: Layout,
    schema: ResultSchema,
    #[serde(default)]
    setup: AnalysisSetup,
    datasets: Vec<Dataset>,
}

pub struct SessionCodec;

impl SessionCodec {
    pub fn encode(body: &SessionBody, writer: impl Write) -> Result<(), SchemaError> {
        let document = DocumentRef {
            format: SESSION_FORMAT,
            version: SESSION_VERSION,
            generator: format!("meltscan {}", env!("CARGO_PKG_VERSION")),
            layout: &body.layout,
            schema: body.schema,
            setup: &body.setup,
            datasets: &body.datasets,
        };
        serde_json::to_writer_pretty(writer, &document)?;
        Ok(())
    }

    pub fn decode(reader: impl Read) -> Result<SessionBody, SchemaError> {
        let value: Value = serde_json::from_reader(reader)?;
        check_header(&value)?;
        let document: Document = serde_json::from_value(value)?;
        let body = SessionBody {
            layout: document.layout,
            schema: document.schema,
            setup: document.setup,
            datasets: document.datasets,
        };
        validate(&body)?;
        Ok(body)
    }

    pub fn save<P: AsRef<Path>>(body: &SessionBody, path: P) -> Result<(), SchemaError> {
        let mut writer = BufWriter::new(File::create(path)?);
        Self::encode(body, &mut writer)?;
        writer.flush()?;
        Ok(())
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<SessionBody, SchemaError> {
        Self::decode(BufReader::new(File::open(path)?))
    }
}

fn check_header(value: &Value) -> Result<(), SchemaError> {
    let format = value
        .get("format")
        .and_then(Value::as_str)
        .unwrap_or_default();
    if format != SESSION_FORMAT {
        return Err(SchemaError::Format(format.to_string()));
    }
    let version = value
        .get("version")
        .and_then(Value::as_u64)
        .ok_or_else(|| SchemaError::Content("missing or non-integer 'version'".into()))?;
    if version != SESSION_VERSION {
        return Err(SchemaError::Version {
            found: version,
            supported: SESSION_VERSION,
        });
    }
    Ok(())
}

fn validate(body: &SessionBody) -> Result<(), SchemaError> {
    let pipeline = validate_setup(&body.setup)?;
    let mut names = HashSet::new();
    for dataset in &body.datasets {
        if !names.insert(dataset.name()) {
            return Err(SchemaError::Content(format!(
                "duplicate dataset '{}'",
                dataset.name()
            )));
        }
        dataset.validate().map_err(SchemaError::Content)?;
        if dataset.settings().model.is_three_state() && !body.schema.is_three_state() {
            return Err(SchemaError::Content(format!(
                "dataset '{}' uses a three-state model but the result schema is two-state",
                dataset.name()
            )));
        }
        let wells: BTreeSet<WellId> = dataset.wells().collect();
        pipeline
            .validate(
                &dataset.settings().preprocessing,
                &wells,
                dataset.temperature(),
                dataset.active_domain(),
            )
            .map_err(|e| {
                SchemaError::Content(format!("dataset '{}': {}", dataset.name(), e))
            })?;
    }
    Ok(())
}

fn validate_setup(setup: &AnalysisSetup) -> Result<PreprocessingPipeline, SchemaError> {
    let pipeline = PreprocessingPipeline::with_stages(&setup.stages)
        .map_err(|e| SchemaError::Content(e.to_string()))?;
    let positive = |v: f64| v.is_finite() && v > 0.0;
    if setup.max_iterations == 0
        || !positive(setup.ftol)
        || !positive(setup.xtol)
        || !positive(setup.reference_temperature)
    {
        return Err(SchemaError::Content("invalid optimizer limits in setup".into()));
    }
    if setup.scoring.is_some_and(|s| !s.is_valid()) {
        return Err(SchemaError::Content("invalid scoring in setup".into()));
    }
    Ok(pipeline)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn body() -> SessionBody {
        let mut raw = BTreeMap::new();
        raw.insert("A1".parse::<WellId>().unwrap(), vec![1.0, 2.0, 3.0]);
        let dataset = Dataset::new("Ratio", vec![300.0, 301.0, 302.0], raw, 1.0).unwrap();
        SessionBody {
            layout: Layout::from_labels([("A1".parse::<WellId>().unwrap(), "buffer")]),
            schema: ResultSchema::TwoState,
            setup: AnalysisSetup {
                stages: vec![Stage::Exclude, Stage::Trim],
                max_iterations: 50,
                scoring: Some(ScoringConfig::NormalizedRmse { scale: 0.1 }),
                ..AnalysisSetup::default()
            },
            datasets: vec![dataset],
        }
    }

    fn encoded() -> String {
        let mut out = Vec::new();
        SessionCodec::encode(&body(), &mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn round_trip_reproduces_body() {
        let restored = SessionCodec::decode(encoded().as_bytes()).unwrap();
        assert_eq!(restored, body());
    }

    #[test]
    fn document_carries_format_and_version() {
        let value: Value = serde_json::from_str(&encoded()).unwrap();
        assert_eq!(value["format"], SESSION_FORMAT);
        assert_eq!(value["version"], SESSION_VERSION);
    }

    #[test]
    fn rejects_other_versions_and_formats() {
        let mut value: Value = serde_json::from_str(&encoded()).unwrap();
        value["version"] = Value::from(2);
        let err = SessionCodec::decode(value.to_string().as_bytes()).unwrap_err();
        assert!(matches!(err, SchemaError::Version { found: 2, supported: 1 }));

        value["format"] = Value::from("moltenprot");
        let err = SessionCodec::decode(value.to_string().as_bytes()).unwrap_err();
        assert!(matches!(err, SchemaError::Format(_)));
    }

    #[test]
    fn rejects_malformed_bodies() {
        let mut value: Value = serde_json::from_str(&encoded()).unwrap();
        value["datasets"] = Value::from("not a list");
        assert!(matches!(
            SessionCodec::decode(value.to_string().as_bytes()),
            Err(SchemaError::Json(_))
        ));

        assert!(matches!(
            SessionCodec::decode("{ truncated".as_bytes()),
            Err(SchemaError::Json(_))
        ));
    }

    #[test]
    fn rejects_inconsistent_content() {
        let mut value: Value = serde_json::from_str(&encoded()).unwrap();
        let dataset = value["datasets"][0].clone();
        value["datasets"].as_array_mut().unwrap().push(dataset);
        assert!(matches!(
            SessionCodec::decode(value.to_string().as_bytes()),
            Err(SchemaError::Content(_))
        ));

        let mut value: Value = serde_json::from_str(&encoded()).unwrap();
        value["datasets"][0]["settings"]["model"] = Value::from("lumry_eyring");
        assert!(matches!(
            SessionCodec::decode(value.to_string().as_bytes()),
            Err(SchemaError::Content(_))
        ));
    }

    #[test]
    fn rejects_settings_the_pipeline_would_refuse() {
        let mut value: Value = serde_json::from_str(&encoded()).unwrap();
        value["datasets"][0]["settings"]["preprocessing"]["median_filter"] = Value::from(4);
        assert!(matches!(
            SessionCodec::decode(value.to_string().as_bytes()),
            Err(SchemaError::Content(msg)) if msg.contains("odd")
        ));

        let mut value: Value = serde_json::from_str(&encoded()).unwrap();
        value["datasets"][0]["settings"]["preprocessing"]["trim_min"] = Value::from(301.5);
        value["datasets"][0]["settings"]["preprocessing"]["trim_max"] = Value::from(300.5);
        assert!(matches!(
            SessionCodec::decode(value.to_string().as_bytes()),
            Err(SchemaError::Content(_))
        ));
    }

    #[test]
    fn rejects_invalid_setup() {
        let mut value: Value = serde_json::from_str(&encoded()).unwrap();
        value["setup"]["stages"] = serde_json::json!(["trim", "blank"]);
        assert!(matches!(
            SessionCodec::decode(value.to_string().as_bytes()),
            Err(SchemaError::Content(_))
        ));

        let mut value: Value = serde_json::from_str(&encoded()).unwrap();
        value["setup"]["max_iterations"] = Value::from(0);
        assert!(matches!(
            SessionCodec::decode(value.to_string().as_bytes()),
            Err(SchemaError::Content(_))
        ));
    }

    #[test]
    fn setup_round_trips_and_defaults_when_absent() {
        let restored = SessionCodec::decode(encoded().as_bytes()).unwrap();
        assert_eq!(restored.setup.stages, vec![Stage::Exclude, Stage::Trim]);
        assert_eq!(restored.setup.max_iterations, 50);
        assert_eq!(
            restored.setup.scoring,
            Some(ScoringConfig::NormalizedRmse { scale: 0.1 })
        );

        let mut value: Value = serde_json::from_str(&encoded()).unwrap();
        value.as_object_mut().unwrap().remove("setup");
        let restored = SessionCodec::decode(value.to_string().as_bytes()).unwrap();
        assert_eq!(restored.setup, AnalysisSetup::default());
    }

    #[test]
    fn saves_and_loads_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        SessionCodec::save(&body(), &path).unwrap();
        assert_eq!(SessionCodec::load(&path).unwrap(), body());
    }
}
