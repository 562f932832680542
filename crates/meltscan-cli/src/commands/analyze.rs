use crate::cli::AnalyzeArgs;
use crate::config::{AppConfig, InputKind, build_config};
use crate::error::{CliError, Result};
use crate::utils::progress::CliProgressHandler;
use meltscan::core::io::plain_csv::PlainCsv;
use meltscan::core::models::results::FitStatus;
use meltscan::engine::progress::ProgressReporter;
use meltscan::workflows::{DatasetSelector, MultiDatasetManager};
use std::fs::File;
use tracing::{info, warn};

pub fn run(args: AnalyzeArgs, jobs: usize, quiet: bool) -> Result<()> {
    info!("Merging configuration from file and CLI arguments...");
    let config = build_config(&args)?;

    let mut manager = load_manager(&config)?;
    if let Some(layout_path) = &config.layout_path {
        info!("Loading layout from {:?}", layout_path);
        manager
            .load_layout(layout_path)
            .map_err(|e| CliError::parsing(layout_path, e))?;
    }
    if !config.analysis.is_empty() {
        manager
            .set_analysis_options(&DatasetSelector::All, &config.analysis)
            .map_err(|e| CliError::Argument(e.to_string()))?;
    }

    let progress_handler = if quiet {
        CliProgressHandler::hidden()
    } else {
        CliProgressHandler::new()
    };
    let reporter = ProgressReporter::with_callback(progress_handler.get_callback());

    println!(
        "Analysing {} dataset(s) with {} job(s)...",
        manager.datasets(false).len(),
        jobs
    );
    manager.prepare_and_analyse_all(jobs, &reporter)?;

    for dataset in manager.datasets(false) {
        let Some(results) = dataset.results() else {
            continue;
        };
        let failed = results
            .rows()
            .iter()
            .filter(|r| matches!(r.status, FitStatus::Failed(_)))
            .count();
        if dataset.is_skipped() {
            println!("  {}: skipped", dataset.name());
        } else {
            println!(
                "  {}: {} fitted, {} failed ({} wells)",
                dataset.name(),
                results.fitted_count(),
                failed,
                results.len()
            );
        }
        if failed > 0 {
            warn!("{} well(s) of '{}' could not be fitted.", failed, dataset.name());
        }
    }

    info!("Writing output to {:?}", &config.output_dir);
    let written = manager.write_output_all(&config.output_dir, &config.export, jobs, None)?;
    println!(
        "✓ Wrote {} file(s) to: {}",
        written.len(),
        config.output_dir.display()
    );
    Ok(())
}

fn load_manager(config: &AppConfig) -> Result<MultiDatasetManager> {
    let path = &config.input_path;
    let mut manager = match config.input_kind {
        InputKind::Session => {
            info!("Restoring session from {:?}", path);
            MultiDatasetManager::from_session(path).map_err(|e| CliError::parsing(path, e))?
        }
        InputKind::Csv => {
            info!("Reading plate data from {:?}", path);
            let import = PlainCsv::read_with(File::open(path)?, &config.import)
                .map_err(|e| CliError::parsing(path, e))?;
            MultiDatasetManager::from_import(import).map_err(|e| CliError::parsing(path, e))?
        }
    };
    if let Some(pipeline) = &config.pipeline {
        manager = manager.with_pipeline(pipeline.clone());
    }
    if let Some(fit) = config.fit {
        manager = manager.with_fit_config(fit);
    }
    if let Some(scoring) = config.scoring {
        manager = scoring.install(manager);
    }
    Ok(manager)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fmt::Write as _;
    use std::fs;
    use std::path::PathBuf;
    use tempfile::tempdir;

    fn write_plate(path: &std::path::Path) {
        let mut csv = String::from("Temperature,A1,A2,B1\n");
        for i in 0..=80 {
            let t = 25.0 + 0.5 * i as f64;
            let row: Vec<String> = [47.0, 50.0, 53.0]
                .iter()
                .map(|tm| {
                    let x = (t - tm) / 1.5;
                    let unfolded = 1.0 / (1.0 + (-x).exp());
                    format!("{:.6}", 1.0 + unfolded)
                })
                .collect();
            writeln!(csv, "{},{}", t, row.join(",")).unwrap();
        }
        fs::write(path, csv).unwrap();
    }

    fn args(input: PathBuf, output: PathBuf) -> AnalyzeArgs {
        AnalyzeArgs {
            input,
            output,
            config: None,
            layout: None,
            readout: None,
            unit: None,
            scan_rate: None,
            model: None,
            dcp: None,
            trim_min: None,
            trim_max: None,
            exclude: vec![],
            blanks: vec![],
            report: None,
            session: true,
            min_score: None,
            merge_duplicates: false,
            set_values: vec![],
        }
    }

    #[test]
    fn analyze_csv_then_reanalyze_session() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("plate.csv");
        write_plate(&input);
        let out = dir.path().join("out");

        let mut first = args(input, out.clone());
        first.exclude = vec!["B1".to_string()];
        first.report = Some("html".to_string());
        run(first, 2, true).unwrap();

        for name in [
            "Signal_raw.csv",
            "Signal_results.csv",
            "summary.csv",
            "session.json",
            "report.html",
        ] {
            assert!(out.join(name).exists(), "missing {}", name);
        }

        let out2 = dir.path().join("out2");
        let mut second = args(out.join("session.json"), out2.clone());
        second.session = false;
        second.model = Some("skip".to_string());
        run(second, 1, true).unwrap();

        let summary = fs::read_to_string(out2.join("summary.csv")).unwrap();
        assert_eq!(summary.lines().count(), 1);
        assert!(!out2.join("session.json").exists());
    }

    #[test]
    fn missing_input_is_an_io_error() {
        let dir = tempdir().unwrap();
        let result = run(
            args(dir.path().join("missing.csv"), dir.path().join("out")),
            1,
            true,
        );
        assert!(matches!(result, Err(CliError::Io(_))));
    }

    #[test]
    fn unknown_well_in_exclusion_is_rejected() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("plate.csv");
        write_plate(&input);
        let mut bad = args(input, dir.path().join("out"));
        bad.exclude = vec!["H12".to_string()];
        assert!(matches!(run(bad, 1, true), Err(CliError::Argument(_))));
    }
}
