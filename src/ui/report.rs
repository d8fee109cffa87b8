//! Per-file reports and the run summary.

use crate::core::types::ScanVerdict;
use crate::pe::ModuleImport;
use crate::utils::file_name;
use serde::Serialize;
use std::path::PathBuf;

/// The scan outcome for one input file.
#[derive(Debug, Serialize)]
pub struct FileReport {
    pub path: PathBuf,
    pub verdict: ScanVerdict,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub suspicions: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entropy: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub imports: Option<Vec<ModuleImport>>,
}

impl FileReport {
    /// A file that is not a PE (or could not be read).
    pub fn not_pe(path: PathBuf) -> Self {
        Self {
            path,
            verdict: ScanVerdict::NotPe,
            tool: None,
            suspicions: Vec::new(),
            entropy: None,
            imports: None,
        }
    }

    /// A parsed file, with or without a signature match.
    pub fn scanned(path: PathBuf, tool: Option<String>, suspicions: Vec<String>) -> Self {
        Self {
            path,
            verdict: if tool.is_some() {
                ScanVerdict::Matched
            } else {
                ScanVerdict::NoMatch
            },
            tool,
            suspicions,
            entropy: None,
            imports: None,
        }
    }

    /// Render the per-file console line(s).
    pub fn print_text(&self, show_suspicions: bool) {
        let name = file_name(&self.path);
        match self.verdict {
            ScanVerdict::Matched => {
                println!("{}: {}", name, self.tool.as_deref().unwrap_or_default())
            }
            ScanVerdict::NoMatch => println!("{}: no match", name),
            ScanVerdict::NotPe => println!("{}: not a PE file", name),
        }

        if let Some(entropy) = self.entropy {
            println!("  entropy: {:.2}", entropy);
        }
        if show_suspicions && !self.suspicions.is_empty() {
            println!("  suspicious: {}", self.suspicions.join(", "));
        }
        if let Some(imports) = &self.imports {
            for module in imports {
                println!("  imports {} ({} APIs)", module.name, module.apis.len());
                for api in &module.apis {
                    println!("    {}", api);
                }
            }
        }
    }
}

/// Aggregate results for one run.
#[derive(Debug, Serialize)]
pub struct ScanSummary {
    pub files_scanned: usize,
    pub matches: usize,
    pub db_load_ms: u128,
    pub scan_ms: u128,
    pub reports: Vec<FileReport>,
}

impl ScanSummary {
    pub fn new(db_load_ms: u128) -> Self {
        Self {
            files_scanned: 0,
            matches: 0,
            db_load_ms,
            scan_ms: 0,
            reports: Vec::new(),
        }
    }

    /// Record one file's report.
    pub fn push(&mut self, report: FileReport) {
        self.files_scanned += 1;
        if report.verdict == ScanVerdict::Matched {
            self.matches += 1;
        }
        self.reports.push(report);
    }

    /// Render the closing summary lines.
    pub fn print_text(&self) {
        println!();
        println!(
            "Finished scanning in {}ms - matched {} of {} files.",
            self.scan_ms, self.matches, self.files_scanned
        );
    }
}
