//! Command-line interface: `run` executes the pipeline over an input
//! document, `audit` queries the audit log (`spec.md` §6.1 ambient CLI).

#![allow(missing_docs)]

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::audit::AuditLog;
use crate::core::config::Config;
use crate::core::errors::{GeoFixError, Result};
use crate::decision::NullOracle;
use crate::ingest;
use crate::model::ErrorKind;
use crate::pipeline::Pipeline;

#[derive(Debug, Parser)]
#[command(name = "geofix", about = "Geospatial error-correction core", version)]
pub struct Cli {
    /// Path to a TOML configuration file (default: resolved via `GEOFIX_CONFIG` or `geofix.toml`).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the pipeline over an input document and print a summary.
    Run {
        /// Path to a JSON `InputDoc` (features, roads, boundary as WKT).
        input: PathBuf,
        /// Path to the audit database (default: `geofix-audit.db`).
        #[arg(long, default_value = "geofix-audit.db")]
        audit_db: PathBuf,
        /// Resolve every error via rules only; never consult the oracle.
        #[arg(long)]
        rules_only: bool,
        /// Write the updated feature set (as WKT) to this path.
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Query the audit log.
    Audit {
        #[arg(long, default_value = "geofix-audit.db")]
        audit_db: PathBuf,
        #[arg(long)]
        feature_id: Option<String>,
        #[arg(long)]
        session_id: Option<String>,
        #[arg(long)]
        error_kind: Option<String>,
        #[arg(long, default_value_t = 50)]
        limit: u32,
    },
}

/// Entry point invoked by `main`. Returns `Err` for the process to report
/// and translate into a non-zero exit code.
pub fn run(cli: &Cli) -> Result<()> {
    let config = Config::load(cli.config.as_deref())?;

    match &cli.command {
        Command::Run {
            input,
            audit_db,
            rules_only,
            out,
        } => run_pipeline(&config, input, audit_db, *rules_only, out.as_deref()),
        Command::Audit {
            audit_db,
            feature_id,
            session_id,
            error_kind,
            limit,
        } => run_audit_query(audit_db, feature_id.as_deref(), session_id.as_deref(), error_kind.as_deref(), *limit),
    }
}

fn run_pipeline(
    config: &Config,
    input: &std::path::Path,
    audit_db: &std::path::Path,
    rules_only: bool,
    out: Option<&std::path::Path>,
) -> Result<()> {
    let raw = std::fs::read_to_string(input).map_err(|source| GeoFixError::io(input, source))?;
    let doc: ingest::InputDoc = serde_json::from_str(&raw)?;
    let ingested = ingest::ingest(&doc)?;

    let oracle = NullOracle;
    let mut pipeline = Pipeline::new(config, &oracle);
    pipeline.rules_only = rules_only;

    let audit = AuditLog::open(audit_db)?;
    let session_id = uuid::Uuid::new_v4().to_string();

    let report = pipeline.run(
        ingested.features,
        &ingested.roads,
        ingested.boundary.as_ref(),
        &audit,
        &session_id,
    )?;

    let summary = audit.session_summary(&session_id)?;
    println!("session {session_id}");
    println!(
        "decided {} errors: {} applied, {} rolled back, {} pending review, {} skipped",
        summary.total, summary.applied, summary.rolled_back, summary.pending_review, summary.skipped
    );

    if let Some(out_path) = out {
        use wkt::ToWkt;
        let wkt_lines: Vec<String> = report
            .features
            .iter()
            .map(|f| format!("{}\t{}", f.id, f.geometry.wkt_string()))
            .collect();
        std::fs::write(out_path, wkt_lines.join("\n")).map_err(|source| GeoFixError::io(out_path, source))?;
    }

    Ok(())
}

fn run_audit_query(
    audit_db: &std::path::Path,
    feature_id: Option<&str>,
    session_id: Option<&str>,
    error_kind: Option<&str>,
    limit: u32,
) -> Result<()> {
    let audit = AuditLog::open(audit_db)?;
    let kind = error_kind.map(parse_error_kind).transpose()?;
    let rows = audit.query(feature_id, session_id, kind, limit)?;
    for row in rows {
        println!(
            "{} [{}] {} {} -> {} ({}, conf {:.2}) {}",
            row.timestamp.to_rfc3339(),
            row.session_id,
            row.feature_id,
            row.error_kind.as_str(),
            row.fix_kind.as_str(),
            row.action.as_str(),
            row.confidence,
            row.rationale,
        );
    }
    Ok(())
}

fn parse_error_kind(s: &str) -> Result<ErrorKind> {
    serde_json::from_value(serde_json::Value::String(s.to_string())).map_err(|_| GeoFixError::InvalidConfig {
        details: format!("unknown error kind: {s}"),
    })
}
