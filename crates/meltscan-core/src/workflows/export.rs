use super::combine::{CombineMode, CombineOptions, combine};
use crate::core::io::export::write_table_to_path;
use crate::core::io::layout_csv::write_layout;
use crate::core::io::session::{AnalysisSetup, SessionBody, SessionCodec};
use crate::core::models::dataset::{Dataset, curves_table};
use crate::core::models::layout::Layout;
use crate::core::models::results::{ResultSchema, Table};
use crate::engine::error::{EngineError, ExportError, ValidationError};
use crate::engine::parallel::WorkerPool;
use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt::Write as _;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{info, instrument};

/// PDF back ends are not re-entrant; every PDF render in the process holds this lock.
static PDF_RENDER_LOCK: Mutex<()> = Mutex::new(());

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReportFormat {
    Pdf,
    XlsxSummary,
    HtmlInteractive,
}

impl ReportFormat {
    pub fn name(&self) -> &'static str {
        match self {
            ReportFormat::Pdf => "pdf",
            ReportFormat::XlsxSummary => "xlsx-summary",
            ReportFormat::HtmlInteractive => "html-interactive",
        }
    }

    pub fn file_name(&self) -> &'static str {
        match self {
            ReportFormat::Pdf => "report.pdf",
            ReportFormat::XlsxSummary => "summary.xlsx",
            ReportFormat::HtmlInteractive => "report.html",
        }
    }
}

impl std::str::FromStr for ReportFormat {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pdf" => Ok(ReportFormat::Pdf),
            "xlsx" | "xlsx-summary" => Ok(ReportFormat::XlsxSummary),
            "html" | "html-interactive" => Ok(ReportFormat::HtmlInteractive),
            other => Err(ValidationError::InvalidSetting {
                name: "report",
                reason: format!("unknown report format '{}'", other),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ExportOptions {
    pub report: Option<ReportFormat>,
    pub session: bool,
    /// How `summary.csv` is combined; always written in filtered mode.
    pub summary: CombineOptions,
}

/// Produces one report file from an export snapshot.
pub trait ReportRenderer: Send + Sync {
    fn format(&self) -> ReportFormat;

    fn render(&self, snapshot: &ExportSnapshot, path: &Path) -> Result<(), ExportError>;
}

/// Static HTML page with the summary and the per-dataset result tables.
#[derive(Debug, Clone, Copy, Default)]
pub struct HtmlSummaryReport;

impl HtmlSummaryReport {
    pub fn to_html(&self, snapshot: &ExportSnapshot) -> Result<String, ExportError> {
        let mut html = String::new();
        let fmt_err = |_: std::fmt::Error| ExportError::Render {
            format: ReportFormat::HtmlInteractive.name(),
            message: "formatting failed".into(),
        };
        writeln!(html, "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">")
            .map_err(fmt_err)?;
        writeln!(html, "<title>meltscan report</title>\n</head>\n<body>").map_err(fmt_err)?;
        writeln!(html, "<h1>Summary</h1>").map_err(fmt_err)?;
        let summary = snapshot
            .summary(&CombineOptions::default())
            .map_err(|e| ExportError::Render {
                format: ReportFormat::HtmlInteractive.name(),
                message: e.to_string(),
            })?;
        html_table(&mut html, &summary).map_err(fmt_err)?;
        writeln!(html, "<h1>Layout</h1>").map_err(fmt_err)?;
        layout_table(&mut html, &snapshot.layout).map_err(fmt_err)?;
        for dataset in &snapshot.datasets {
            writeln!(
                html,
                "<h2>{} <small>({})</small></h2>",
                escape(dataset.name()),
                escape(dataset.settings().model.name())
            )
            .map_err(fmt_err)?;
            match dataset.results() {
                Some(results) => {
                    let table = results.to_table(&snapshot.layout, snapshot.schema);
                    html_table(&mut html, &table).map_err(fmt_err)?
                }
                None => writeln!(html, "<p>Not analysed.</p>").map_err(fmt_err)?,
            }
        }
        writeln!(html, "</body>\n</html>").map_err(fmt_err)?;
        Ok(html)
    }
}

impl ReportRenderer for HtmlSummaryReport {
    fn format(&self) -> ReportFormat {
        ReportFormat::HtmlInteractive
    }

    fn render(&self, snapshot: &ExportSnapshot, path: &Path) -> Result<(), ExportError> {
        let html = self.to_html(snapshot)?;
        let mut writer = BufWriter::new(File::create(path)?);
        writer.write_all(html.as_bytes())?;
        writer.flush()?;
        Ok(())
    }
}

fn html_table(out: &mut String, table: &Table) -> std::fmt::Result {
    out.push_str("<table>\n<tr>");
    for column in table.key_columns.iter().chain(&table.value_columns) {
        write!(out, "<th>{}</th>", escape(column))?;
    }
    out.push_str("</tr>\n");
    for row in &table.rows {
        out.push_str("<tr>");
        for key in &row.keys {
            write!(out, "<td>{}</td>", escape(key))?;
        }
        for value in &row.values {
            if value.is_finite() {
                write!(out, "<td>{:.4}</td>", value)?;
            } else {
                out.push_str("<td></td>");
            }
        }
        out.push_str("</tr>\n");
    }
    out.push_str("</table>\n");
    Ok(())
}

fn layout_table(out: &mut String, layout: &Layout) -> std::fmt::Result {
    if layout.is_empty() {
        out.push_str("<p>No conditions assigned.</p>\n");
        return Ok(());
    }
    out.push_str("<table>\n<tr><th>ID</th><th>Condition</th></tr>\n");
    for (well, condition) in layout.labels() {
        writeln!(out, "<tr><td>{}</td><td>{}</td></tr>", well, escape(condition))?;
    }
    out.push_str("</table>\n");
    Ok(())
}

fn escape(text: &str) -> Cow<'_, str> {
    html_escape::encode_safe(text)
}

/// A copy of everything an export needs, detached from the manager.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportSnapshot {
    pub layout: Layout,
    pub schema: ResultSchema,
    pub setup: AnalysisSetup,
    pub datasets: Vec<Dataset>,
}

impl ExportSnapshot {
    pub fn summary(&self, options: &CombineOptions) -> Result<Table, ValidationError> {
        let options = CombineOptions {
            mode: CombineMode::Filtered,
            ..options.clone()
        };
        let refs: Vec<&Dataset> = self.datasets.iter().collect();
        let combined = combine(&refs, &self.layout, self.schema, &options)?;
        Ok(combined.summary().cloned().unwrap_or_default())
    }

    /// Writes the tables, the layout and the optional session and report
    /// into `outfolder`, returning the written paths.
    #[instrument(skip_all, name = "export", fields(outfolder = %outfolder.display()))]
    pub fn write_all(
        &self,
        outfolder: &Path,
        options: &ExportOptions,
        n_jobs: usize,
        renderer: Option<&dyn ReportRenderer>,
    ) -> Result<Vec<PathBuf>, EngineError> {
        let builtin = HtmlSummaryReport;
        let renderer = match options.report {
            None => None,
            Some(format) => match renderer {
                Some(r) if r.format() == format => Some(r),
                None if format == ReportFormat::HtmlInteractive => {
                    Some(&builtin as &dyn ReportRenderer)
                }
                _ => return Err(ValidationError::NoRenderer(format.name()).into()),
            },
        };
        let stems = dataset_stems(&self.datasets)?;
        let summary = self.summary(&options.summary)?;
        let pool = WorkerPool::new(n_jobs)?;
        fs::create_dir_all(outfolder).map_err(ExportError::from)?;

        let jobs: Vec<(&Dataset, String)> = self.datasets.iter().zip(stems).collect();
        let per_dataset: Vec<Result<Vec<PathBuf>, ExportError>> = pool.map(&jobs, |(ds, stem)| {
            write_dataset_tables(ds, stem, &self.layout, self.schema, outfolder)
        });
        let mut written = Vec::new();
        for result in per_dataset {
            written.extend(result?);
        }

        let summary_path = outfolder.join("summary.csv");
        write_table_to_path(&summary, &summary_path).map_err(ExportError::from)?;
        written.push(summary_path);

        let layout_path = outfolder.join("layout.csv");
        let file = File::create(&layout_path).map_err(ExportError::from)?;
        write_layout(&self.layout, BufWriter::new(file))?;
        written.push(layout_path);

        if options.session {
            let session_path = outfolder.join("session.json");
            let body = SessionBody {
                layout: self.layout.clone(),
                schema: self.schema,
                setup: self.setup.clone(),
                datasets: self.datasets.clone(),
            };
            SessionCodec::save(&body, &session_path).map_err(ExportError::from)?;
            written.push(session_path);
        }

        if let Some(renderer) = renderer {
            let format = renderer.format();
            let path = outfolder.join(format.file_name());
            if format == ReportFormat::Pdf {
                let _guard = PDF_RENDER_LOCK
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner());
                renderer.render(self, &path)?;
            } else {
                pool.run(|| renderer.render(self, &path))?;
            }
            written.push(path);
        }

        info!("Wrote {} files.", written.len());
        Ok(written)
    }
}

/// File-system friendly form of a dataset name.
pub fn file_stem(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// File stems of `datasets`, rejecting names that sanitise to the same stem.
fn dataset_stems(datasets: &[Dataset]) -> Result<Vec<String>, ValidationError> {
    let mut seen: HashMap<String, &str> = HashMap::new();
    let mut stems = Vec::with_capacity(datasets.len());
    for dataset in datasets {
        let stem = file_stem(dataset.name());
        if let Some(first) = seen.insert(stem.clone(), dataset.name()) {
            return Err(ValidationError::FileNameCollision {
                first: first.to_string(),
                second: dataset.name().to_string(),
                stem,
            });
        }
        stems.push(stem);
    }
    Ok(stems)
}

fn write_dataset_tables(
    dataset: &Dataset,
    stem: &str,
    layout: &Layout,
    schema: ResultSchema,
    outfolder: &Path,
) -> Result<Vec<PathBuf>, ExportError> {
    let mut written = Vec::new();
    let mut write = |suffix: &str, table: Table| -> Result<(), ExportError> {
        let path = outfolder.join(format!("{}_{}.csv", stem, suffix));
        write_table_to_path(&table, &path)?;
        written.push(path);
        Ok(())
    };

    write("raw", dataset.raw_table())?;
    if let Some(derived) = dataset.derived() {
        write("processed", curves_table(&derived.processed))?;
        if !derived.derivative.is_empty() {
            write("derivative", curves_table(&derived.derivative))?;
        }
        if !derived.baseline_corrected.is_empty() {
            write("unfolded", curves_table(&derived.baseline_corrected))?;
        }
    }
    if let Some(results) = dataset.results() {
        write("results", results.to_table(layout, schema))?;
    }
    Ok(written)
}
