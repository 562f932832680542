use crate::cli::InspectArgs;
use crate::error::{CliError, Result};
use meltscan::workflows::{MultiDatasetManager, SettingsRow};
use std::fmt::Write as _;
use tracing::info;

pub fn run(args: InspectArgs) -> Result<()> {
    info!("Reading session from {:?}", &args.input);
    let manager = MultiDatasetManager::from_session(&args.input)
        .map_err(|e| CliError::parsing(&args.input, e))?;
    print!("{}", describe(&manager).map_err(|e| CliError::Other(e.into()))?);
    Ok(())
}

fn describe(manager: &MultiDatasetManager) -> std::result::Result<String, std::fmt::Error> {
    let mut out = String::new();
    writeln!(
        out,
        "Session: {} dataset(s), {} labeled well(s){}",
        manager.dataset_names().len(),
        manager.layout().len(),
        if manager.is_three_state_aware() {
            ", three-state columns enabled"
        } else {
            ""
        }
    )?;
    for row in manager.get_analysis_settings() {
        describe_dataset(&mut out, manager, &row)?;
    }
    Ok(out)
}

fn describe_dataset(
    out: &mut String,
    manager: &MultiDatasetManager,
    row: &SettingsRow,
) -> std::fmt::Result {
    let settings = &row.settings;
    let prep = &settings.preprocessing;
    writeln!(out)?;
    writeln!(out, "[{}]", row.dataset)?;
    writeln!(out, "  model:          {}", settings.model)?;
    writeln!(
        out,
        "  domain:         {:.2} K - {:.2} K",
        row.active_domain.0, row.active_domain.1
    )?;
    writeln!(out, "  scan rate:      {} K/min", row.scan_rate)?;
    match settings.dcp {
        Some(dcp) => writeln!(out, "  dCp:            {} kJ/(mol K)", dcp)?,
        None => writeln!(out, "  dCp:            not set")?,
    }
    writeln!(out, "  excluded wells: {}", join_wells(prep.exclude.iter()))?;
    writeln!(out, "  blank wells:    {}", join_wells(prep.blanks.iter()))?;
    if let Some(three_state) = &row.three_state {
        writeln!(
            out,
            "  aggregation:    {}",
            three_state.aggregation_threshold
        )?;
    }

    let Some(dataset) = manager.dataset(&row.dataset) else {
        return Ok(());
    };
    match dataset.results() {
        Some(results) => writeln!(
            out,
            "  results:        {} of {} wells fitted",
            results.fitted_count(),
            results.len()
        )?,
        None => writeln!(out, "  results:        not analysed")?,
    }
    for entry in dataset.protocol() {
        writeln!(out, "  - {}", entry)?;
    }
    Ok(())
}

fn join_wells<'a, I, T>(wells: I) -> String
where
    I: Iterator<Item = &'a T>,
    T: ToString + 'a,
{
    let wells: Vec<String> = wells.map(ToString::to_string).collect();
    if wells.is_empty() {
        "none".to_string()
    } else {
        wells.join(", ")
    }
}
