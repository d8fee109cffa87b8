//! packscan: identify the packer/protector of Windows PE executables.
//!
//! This is the main entry point for the CLI application.

use packscan::core::config::Config;
use packscan::core::error::Result;
use packscan::pe::PeImage;
use packscan::ui::cli::{Cli, OutputFormat};
use packscan::ui::report::{FileReport, ScanSummary};
use packscan::utils::logging::{init_logging, LogConfig};
use packscan::{ScanEngine, SignatureDatabase};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Instant;

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse_args();

    let log_config = if cli.verbose {
        LogConfig::verbose()
    } else if cli.quiet {
        LogConfig::quiet()
    } else {
        LogConfig::default()
    };
    init_logging(log_config);

    log::info!("packscan v{}", env!("CARGO_PKG_VERSION"));

    let config = Config::load_or_default();
    config.validate()?;
    let database_path = cli.database.unwrap_or_else(|| config.database.path.clone());
    let mode = cli.mode.unwrap_or(config.scan.mode);

    // A database that fails to load is fatal: there is nothing to scan with.
    let started = Instant::now();
    let db = Arc::new(SignatureDatabase::load(&database_path)?);
    let db_load_ms = started.elapsed().as_millis();
    log::info!(
        "Loaded {} signatures from {} in {}ms",
        db.len(),
        database_path.display(),
        db_load_ms
    );

    let engine = ScanEngine::new(Arc::clone(&db));
    let mut summary = ScanSummary::new(db_load_ms);

    let started = Instant::now();
    for path in &cli.files {
        let report = match PeImage::load(path) {
            Ok(pe) => {
                log::debug!(
                    "{}: {} sections, entry point {:#x}, flags {}",
                    path.display(),
                    pe.sections().len(),
                    pe.entry_point_rva(),
                    pe.flags()
                );
                let tool = engine.scan(&pe, mode).map(str::to_string);
                let suspicions = pe.flags().names().iter().map(|s| s.to_string()).collect();
                let mut report = FileReport::scanned(path.clone(), tool, suspicions);
                if cli.entropy {
                    report.entropy = Some(pe.file_entropy());
                }
                if cli.show_imports {
                    report.imports = Some(pe.imports().to_vec());
                }
                report
            }
            Err(e) if e.is_recoverable() => {
                // not a PE, or unreadable: skip it, never abort the run
                log::warn!("Skipping {}: {}", path.display(), e);
                FileReport::not_pe(path.clone())
            }
            Err(e) => return Err(e),
        };

        if cli.format == OutputFormat::Text {
            report.print_text(config.output.show_suspicions || cli.verbose);
        }
        summary.push(report);
    }
    summary.scan_ms = started.elapsed().as_millis();

    match cli.format {
        OutputFormat::Text => summary.print_text(),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&summary)?),
    }

    Ok(())
}
