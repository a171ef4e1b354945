use std::{fs, path::PathBuf};

use anyhow::Context;
use clap::Parser;
use db::{DBService, models::audit_log::CreateAuditLog};
use serde_json::json;
use services::services::{audit::AuditLogger, bulk_import::BulkImportService, config::Config};
use tracing_subscriber::{EnvFilter, prelude::*};

/// Imports agency listings from a CSV file into the directory database.
#[derive(Debug, Parser)]
#[command(name = "import-agencies", version)]
struct Args {
    /// CSV file with a header row; `name` is the only required column.
    #[arg(long)]
    file: PathBuf,

    /// Validate every row and print the report without writing anything.
    #[arg(long)]
    dry_run: bool,

    #[arg(long, env = "DATABASE_URL", default_value = Config::DEFAULT_DATABASE_URL)]
    database_url: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    // Logs go to stderr so stdout stays a clean JSON report.
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let csv = fs::read_to_string(&args.file)
        .with_context(|| format!("failed to read {}", args.file.display()))?;
    let db = DBService::new(&args.database_url).await?;
    let summary = BulkImportService::import(&db.pool, &csv, args.dry_run).await?;

    if !summary.dry_run {
        AuditLogger::new(db.pool.clone())
            .record(
                CreateAuditLog::new(None, "agency.bulk_import", "agency", None).with_changes(
                    json!({
                        "source": args.file.display().to_string(),
                        "total_rows": summary.total_rows,
                        "imported": summary.imported,
                        "skipped": summary.skipped,
                        "failed": summary.failed,
                    }),
                ),
            )
            .await;
    }

    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
