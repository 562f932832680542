use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

const HELP_TEMPLATE: &str = "\
{before-help}{name} {version}
{author-with-newline}{about-with-newline}
{usage-heading} {usage}

{all-args}{after-help}
";

#[derive(Parser, Debug)]
#[command(
    author = "meltscan developers",
    version,
    about = "meltscan - thermal unfolding analysis of 96-well plates: preprocessing, per-well model fits and combined summaries.",
    help_template = HELP_TEMPLATE,
)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity level (-v for INFO, -vv for DEBUG, -vvv for TRACE)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all log output except for errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Write logs to a specified file in addition to the console output
    #[arg(long, global = true, value_name = "PATH")]
    pub log_file: Option<PathBuf>,

    /// Number of parallel fit jobs.
    /// Defaults to the number of available logical cores.
    #[arg(short = 'j', long, global = true, value_name = "NUM")]
    pub jobs: Option<usize>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Preprocess and fit every readout of a plate and write the result tables.
    Analyze(AnalyzeArgs),
    /// Print the datasets and settings stored in a session file.
    Inspect(InspectArgs),
}

/// Arguments for the `analyze` subcommand.
#[derive(Args, Debug, Clone)]
pub struct AnalyzeArgs {
    // --- Core Arguments ---
    /// Plate data: a CSV file (temperature column followed by one column per
    /// well) or a previously saved session (.json).
    #[arg(short, long, required = true, value_name = "PATH")]
    pub input: PathBuf,

    /// Directory the tables, reports and session are written to.
    #[arg(short, long, required = true, value_name = "DIR")]
    pub output: PathBuf,

    /// Path to an analysis configuration file in TOML format.
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Layout file with `ID,Condition` columns.
    #[arg(short, long, value_name = "PATH")]
    pub layout: Option<PathBuf>,

    // --- Import Overrides ---
    /// Name of the readout stored in a CSV input.
    #[arg(long, value_name = "NAME")]
    pub readout: Option<String>,

    /// Temperature unit of a CSV input: celsius, kelvin or auto.
    #[arg(long, value_name = "UNIT")]
    pub unit: Option<String>,

    /// Heating rate in K/min, used by the kinetic models.
    #[arg(long, value_name = "FLOAT")]
    pub scan_rate: Option<f64>,

    // --- Analysis Overrides ---
    /// Unfolding model: santoro1988, irrev, lumry_eyring or skip.
    #[arg(short, long, value_name = "NAME")]
    pub model: Option<String>,

    /// Heat capacity change of unfolding in kJ/(mol K).
    #[arg(long, value_name = "FLOAT")]
    pub dcp: Option<f64>,

    /// Lower bound of the analysed temperature range, in kelvin.
    #[arg(long, value_name = "KELVIN")]
    pub trim_min: Option<f64>,

    /// Upper bound of the analysed temperature range, in kelvin.
    #[arg(long, value_name = "KELVIN")]
    pub trim_max: Option<f64>,

    /// Wells to leave out of the analysis (comma separated, e.g. A1,H12).
    #[arg(long, value_name = "WELLS", value_delimiter = ',')]
    pub exclude: Vec<String>,

    /// Blank wells subtracted from every other well (comma separated).
    #[arg(long, value_name = "WELLS", value_delimiter = ',')]
    pub blanks: Vec<String>,

    // --- Output Overrides ---
    /// Also write a report: html, pdf or xlsx.
    #[arg(long, value_name = "FORMAT")]
    pub report: Option<String>,

    /// Also write `session.json` with the complete analysis state.
    #[arg(long)]
    pub session: bool,

    /// Report NaN in the summary for wells scoring below this value.
    #[arg(long, value_name = "FLOAT")]
    pub min_score: Option<f64>,

    /// Average summary rows that share a condition.
    #[arg(long)]
    pub merge_duplicates: bool,

    /// Set a specific configuration value, overriding the config file.
    /// Can be used multiple times. Example: -S analysis.model=irrev
    #[arg(short = 'S', long = "set", value_name = "KEY=VALUE", num_args(0..))]
    pub set_values: Vec<String>,
}

/// Arguments for the `inspect` subcommand.
#[derive(Args, Debug, Clone)]
pub struct InspectArgs {
    /// Path to a session file.
    #[arg(short, long, required = true, value_name = "PATH")]
    pub input: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn analyze_arguments_parse() {
        let cli = Cli::parse_from([
            "meltscan", "-vv", "-j", "4", "analyze", "-i", "plate.csv", "-o", "out", "--model",
            "irrev", "--exclude", "A1,B2", "-S", "fitting.max-iterations=50",
        ]);
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.jobs, Some(4));
        let Commands::Analyze(args) = cli.command else {
            panic!("expected analyze");
        };
        assert_eq!(args.model.as_deref(), Some("irrev"));
        assert_eq!(args.exclude, vec!["A1", "B2"]);
        assert_eq!(args.set_values, vec!["fitting.max-iterations=50"]);
    }

    #[test]
    fn quiet_conflicts_with_verbose() {
        assert!(Cli::try_parse_from(["meltscan", "-q", "-v", "inspect", "-i", "s.json"]).is_err());
    }
}
