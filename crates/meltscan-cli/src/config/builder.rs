use super::defaults::DefaultsConfig;
use super::file::{FileConfig, FilePreprocessingConfig};
use super::models::{AppConfig, InputKind, ScoringChoice};
use crate::cli::AnalyzeArgs;
use crate::error::{CliError, Result};
use meltscan::core::io::plain_csv::{PlainCsvOptions, TemperatureUnit};
use meltscan::core::models::dataset::DEFAULT_SCAN_RATE;
use meltscan::core::models::settings::BaselineBounds;
use meltscan::core::models::well::WellId;
use meltscan::core::preprocessing::{PreprocessingPipeline, Stage};
use meltscan::engine::config::{AnalysisOptions, FitConfig, FitConfigBuilder};
use meltscan::workflows::{CombineOptions, ExportOptions, ReportFormat};
use std::path::Path;
use std::str::FromStr;

pub fn build_config(args: &AnalyzeArgs) -> Result<AppConfig> {
    let defaults = DefaultsConfig::default();

    let file_config = if let Some(config_path) = &args.config {
        FileConfig::from_file(config_path)?
    } else {
        FileConfig::default()
    };

    let mut file_config = apply_set_values(file_config, &args.set_values)?;

    let import_file = file_config.import.take().unwrap_or_default();
    let unit = args
        .unit
        .as_deref()
        .or(import_file.unit.as_deref())
        .unwrap_or(&defaults.unit);
    let import = PlainCsvOptions {
        readout: args
            .readout
            .clone()
            .or(import_file.readout)
            .unwrap_or_else(|| defaults.readout.clone()),
        unit: parse_unit(unit)?,
        scan_rate: args
            .scan_rate
            .or(import_file.scan_rate)
            .unwrap_or(DEFAULT_SCAN_RATE),
    };

    let prep_file = file_config.preprocessing.take().unwrap_or_default();
    let pipeline = build_pipeline(prep_file.stages.as_deref())?;
    let analysis_file = file_config.analysis.take().unwrap_or_default();

    let mut analysis = preprocessing_options(args, &prep_file)?;
    if let Some(model) = args.model.as_deref().or(analysis_file.model.as_deref()) {
        analysis = analysis
            .model_name(model)
            .map_err(|e| CliError::Argument(e.to_string()))?;
    }
    if let Some(dcp) = args.dcp.or(analysis_file.dcp) {
        analysis = analysis.dcp(Some(dcp));
    }
    if let Some(degree) = analysis_file.baseline_degree {
        analysis = analysis.baseline_degree(degree);
    }
    match (analysis_file.baseline_fraction, analysis_file.baseline_points) {
        (Some(_), Some(_)) => {
            return Err(CliError::Config(
                "`baseline-fraction` and `baseline-points` are mutually exclusive".to_string(),
            ));
        }
        (Some(fraction), None) => {
            analysis = analysis.baseline_bounds(BaselineBounds::Fraction(fraction));
        }
        (None, Some(points)) => {
            analysis = analysis.baseline_bounds(BaselineBounds::Points(points));
        }
        (None, None) => {}
    }
    if let Some(threshold) = analysis_file.onset_threshold {
        analysis = analysis.onset_threshold(threshold);
    }
    if let Some(threshold) = analysis_file.aggregation_threshold {
        analysis = analysis.aggregation_threshold(threshold);
    }
    let scoring = analysis_file
        .scoring
        .as_deref()
        .map(parse_scoring)
        .transpose()?;

    let fit = merge_fitting(&mut file_config, &defaults.fit)?;

    let export_file = file_config.export.take().unwrap_or_default();
    let report = args
        .report
        .as_deref()
        .or(export_file.report.as_deref())
        .map(ReportFormat::from_str)
        .transpose()
        .map_err(|e| CliError::Argument(e.to_string()))?;
    let mut summary = CombineOptions::new()
        .merge_duplicates(
            args.merge_duplicates
                || export_file
                    .merge_duplicates
                    .unwrap_or(defaults.merge_duplicates),
        );
    if let Some(metrics) = &export_file.metrics {
        summary = summary
            .metric_names(metrics.as_slice())
            .map_err(|e| CliError::Config(e.to_string()))?;
    }
    if let Some(score) = args.min_score.or(export_file.min_score) {
        summary = summary.min_score(score);
    }
    let export = ExportOptions {
        report,
        session: args.session || export_file.session.unwrap_or(defaults.session),
        summary,
    };

    Ok(AppConfig {
        input_path: args.input.clone(),
        input_kind: input_kind(&args.input),
        output_dir: args.output.clone(),
        layout_path: args.layout.clone(),
        import,
        pipeline,
        analysis,
        fit,
        scoring,
        export,
    })
}

fn input_kind(path: &Path) -> InputKind {
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("json") => InputKind::Session,
        _ => InputKind::Csv,
    }
}

fn parse_unit(value: &str) -> Result<TemperatureUnit> {
    match value.trim().to_ascii_lowercase().as_str() {
        "c" | "celsius" => Ok(TemperatureUnit::Celsius),
        "k" | "kelvin" => Ok(TemperatureUnit::Kelvin),
        "auto" => Ok(TemperatureUnit::Auto),
        other => Err(CliError::Argument(format!(
            "Unknown temperature unit '{}'. Expected celsius, kelvin or auto.",
            other
        ))),
    }
}

fn parse_scoring(value: &str) -> Result<ScoringChoice> {
    match value.trim() {
        "r-squared" => Ok(ScoringChoice::RSquared),
        "normalized-rmse" => Ok(ScoringChoice::NormalizedRmse),
        other => Err(CliError::Config(format!(
            "Unknown scoring '{}'. Expected r-squared or normalized-rmse.",
            other
        ))),
    }
}

fn parse_wells(wells: &[String]) -> Result<Vec<WellId>> {
    wells
        .iter()
        .filter(|w| !w.trim().is_empty())
        .map(|w| {
            w.parse::<WellId>()
                .map_err(|e| CliError::Argument(e.to_string()))
        })
        .collect()
}

fn build_pipeline(stages: Option<&[String]>) -> Result<Option<PreprocessingPipeline>> {
    let Some(stages) = stages else {
        return Ok(None);
    };
    let stages = stages
        .iter()
        .map(|s| s.parse::<Stage>())
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| CliError::Config(e.to_string()))?;
    PreprocessingPipeline::with_stages(&stages)
        .map(Some)
        .map_err(|e| CliError::Config(e.to_string()))
}

fn preprocessing_options(
    args: &AnalyzeArgs,
    file: &FilePreprocessingConfig,
) -> Result<AnalysisOptions> {
    let mut options = AnalysisOptions::new();

    let exclude = if args.exclude.is_empty() {
        file.exclude.clone()
    } else {
        Some(args.exclude.clone())
    };
    if let Some(wells) = exclude {
        options = options.exclude(parse_wells(&wells)?);
    }
    let blanks = if args.blanks.is_empty() {
        file.blanks.clone()
    } else {
        Some(args.blanks.clone())
    };
    if let Some(wells) = blanks {
        options = options.blanks(parse_wells(&wells)?);
    }
    if let Some(invert) = file.invert {
        options = options.invert(invert);
    }
    if let Some(min) = args.trim_min.or(file.trim_min) {
        options = options.trim_min(Some(min));
    }
    if let Some(max) = args.trim_max.or(file.trim_max) {
        options = options.trim_max(Some(max));
    }
    if let Some(window) = file.median_filter {
        options = options.median_filter(Some(window));
    }
    if let Some(width) = file.shrink {
        options = options.shrink(Some(width));
    }
    if let Some(window) = file.savgol {
        options = options.savgol(Some(window));
    }
    Ok(options)
}

/// The `[fitting]` section completed with defaults, or `None` when it is absent.
fn merge_fitting(file_config: &mut FileConfig, defaults: &FitConfig) -> Result<Option<FitConfig>> {
    let Some(file) = file_config.fitting.take() else {
        return Ok(None);
    };
    FitConfigBuilder::new()
        .max_iterations(file.max_iterations.unwrap_or(defaults.max_iterations))
        .ftol(file.ftol.unwrap_or(defaults.ftol))
        .xtol(file.xtol.unwrap_or(defaults.xtol))
        .reference_temperature(
            file.reference_temperature
                .unwrap_or(defaults.reference_temperature),
        )
        .build()
        .map(Some)
        .map_err(|e| CliError::Config(e.to_string()))
}

fn parse_value<T: FromStr>(key: &str, value: &str, kind: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| CliError::Config(format!("Invalid {} value for {}: {}", kind, key, value)))
}

fn parse_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn apply_set_values(mut config: FileConfig, set_values: &[String]) -> Result<FileConfig> {
    for kv_pair in set_values {
        let Some((key, value)) = kv_pair.split_once('=') else {
            return Err(CliError::Config(format!(
                "Invalid --set format: '{}'. Expected KEY=VALUE.",
                kv_pair
            )));
        };
        let key = key.trim();

        match key {
            "import.readout" => {
                config.import.get_or_insert_with(Default::default).readout =
                    Some(value.trim().to_string());
            }
            "import.unit" => {
                config.import.get_or_insert_with(Default::default).unit =
                    Some(value.trim().to_string());
            }
            "import.scan-rate" => {
                config.import.get_or_insert_with(Default::default).scan_rate =
                    Some(parse_value(key, value, "float")?);
            }
            "preprocessing.exclude" => {
                config.preprocessing.get_or_insert_with(Default::default).exclude =
                    Some(parse_list(value));
            }
            "preprocessing.blanks" => {
                config.preprocessing.get_or_insert_with(Default::default).blanks =
                    Some(parse_list(value));
            }
            "preprocessing.stages" => {
                config.preprocessing.get_or_insert_with(Default::default).stages =
                    Some(parse_list(value));
            }
            "preprocessing.invert" => {
                config.preprocessing.get_or_insert_with(Default::default).invert =
                    Some(parse_value(key, value, "boolean")?);
            }
            "preprocessing.trim-min" => {
                config.preprocessing.get_or_insert_with(Default::default).trim_min =
                    Some(parse_value(key, value, "float")?);
            }
            "preprocessing.trim-max" => {
                config.preprocessing.get_or_insert_with(Default::default).trim_max =
                    Some(parse_value(key, value, "float")?);
            }
            "preprocessing.median-filter" => {
                config.preprocessing.get_or_insert_with(Default::default).median_filter =
                    Some(parse_value(key, value, "integer")?);
            }
            "preprocessing.shrink" => {
                config.preprocessing.get_or_insert_with(Default::default).shrink =
                    Some(parse_value(key, value, "float")?);
            }
            "preprocessing.savgol" => {
                config.preprocessing.get_or_insert_with(Default::default).savgol =
                    Some(parse_value(key, value, "integer")?);
            }
            "analysis.model" => {
                config.analysis.get_or_insert_with(Default::default).model =
                    Some(value.trim().to_string());
            }
            "analysis.dcp" => {
                config.analysis.get_or_insert_with(Default::default).dcp =
                    Some(parse_value(key, value, "float")?);
            }
            "analysis.baseline-degree" => {
                config.analysis.get_or_insert_with(Default::default).baseline_degree =
                    Some(parse_value(key, value, "integer")?);
            }
            "analysis.baseline-fraction" => {
                config.analysis.get_or_insert_with(Default::default).baseline_fraction =
                    Some(parse_value(key, value, "float")?);
            }
            "analysis.baseline-points" => {
                config.analysis.get_or_insert_with(Default::default).baseline_points =
                    Some(parse_value(key, value, "integer")?);
            }
            "analysis.onset-threshold" => {
                config.analysis.get_or_insert_with(Default::default).onset_threshold =
                    Some(parse_value(key, value, "float")?);
            }
            "analysis.aggregation-threshold" => {
                config
                    .analysis
                    .get_or_insert_with(Default::default)
                    .aggregation_threshold = Some(parse_value(key, value, "float")?);
            }
            "analysis.scoring" => {
                config.analysis.get_or_insert_with(Default::default).scoring =
                    Some(value.trim().to_string());
            }
            "fitting.max-iterations" => {
                config.fitting.get_or_insert_with(Default::default).max_iterations =
                    Some(parse_value(key, value, "integer")?);
            }
            "fitting.ftol" => {
                config.fitting.get_or_insert_with(Default::default).ftol =
                    Some(parse_value(key, value, "float")?);
            }
            "fitting.xtol" => {
                config.fitting.get_or_insert_with(Default::default).xtol =
                    Some(parse_value(key, value, "float")?);
            }
            "fitting.reference-temperature" => {
                config
                    .fitting
                    .get_or_insert_with(Default::default)
                    .reference_temperature = Some(parse_value(key, value, "float")?);
            }
            "export.report" => {
                config.export.get_or_insert_with(Default::default).report =
                    Some(value.trim().to_string());
            }
            "export.session" => {
                config.export.get_or_insert_with(Default::default).session =
                    Some(parse_value(key, value, "boolean")?);
            }
            "export.metrics" => {
                config.export.get_or_insert_with(Default::default).metrics =
                    Some(parse_list(value));
            }
            "export.min-score" => {
                config.export.get_or_insert_with(Default::default).min_score =
                    Some(parse_value(key, value, "float")?);
            }
            "export.merge-duplicates" => {
                config.export.get_or_insert_with(Default::default).merge_duplicates =
                    Some(parse_value(key, value, "boolean")?);
            }
            _ => {
                return Err(CliError::Config(format!(
                    "Unsupported configuration key for --set: '{}'",
                    key
                )));
            }
        }
    }
    Ok(config)
}
