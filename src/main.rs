use std::path::PathBuf;

use anyhow::Context;
use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand, ValueEnum};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::info;

mod db;
mod error;
mod escalation;
mod ingest;
mod models;
mod normalize;
mod rankings;
mod report;
mod sentiment;
mod state;
mod window;

use crate::error::DashboardError;
use crate::models::{RoleMapping, Settings};
use crate::report::ReportOptions;
use crate::state::{DashboardState, Dataset};
use crate::window::{hours_before, Window};

#[derive(Parser)]
#[command(name = "convo-quality-dashboard")]
#[command(about = "Conversation quality rollups: resolution, escalation, sentiment and toxicity", long_about = None)]
struct Cli {
    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Import scored conversations from a CSV export
    Import {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Import participant role assignments from a CSV file
    ImportRoles {
        #[arg(long)]
        csv: PathBuf,
        /// Upsert into the stored mapping instead of replacing it
        #[arg(long)]
        merge: bool,
    },
    /// Print headline metrics for every window
    Summary {
        #[command(flatten)]
        source: SourceArgs,
    },
    /// Generate a dashboard report
    Report {
        #[command(flatten)]
        source: SourceArgs,
        #[arg(long, value_enum, default_value_t = Window::Days7)]
        window: Window,
        #[arg(long, value_enum, default_value_t = ReportFormat::Markdown)]
        format: ReportFormat,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
        #[arg(long, default_value_t = 10)]
        limit: usize,
        /// Trailing hours covered by the improvement tip summary
        #[arg(long, default_value_t = 24)]
        tip_hours: u32,
    },
}

#[derive(Args)]
struct SourceArgs {
    /// Read conversations from a CSV export instead of Postgres
    #[arg(long)]
    csv: Option<PathBuf>,
    /// Role assignments merged over any stored mapping
    #[arg(long)]
    roles: Option<PathBuf>,
    /// Reference instant (RFC 3339); defaults to the current time
    #[arg(long)]
    now: Option<String>,
    #[arg(long, default_value_t = 0.5)]
    toxicity_threshold: f64,
    #[arg(long, default_value_t = 3)]
    abusive_caps_trigger: u32,
    #[arg(long, default_value_t = 3)]
    min_messages_for_toxicity: u32,
}

impl SourceArgs {
    fn settings(&self) -> Settings {
        Settings {
            toxicity_threshold: self.toxicity_threshold,
            abusive_caps_trigger: self.abusive_caps_trigger,
            min_messages_for_toxicity: self.min_messages_for_toxicity,
        }
    }

    fn reference_time(&self) -> Result<DateTime<Utc>, DashboardError> {
        match &self.now {
            None => Ok(Utc::now()),
            Some(value) => normalize::parse_timestamp(value)
                .ok_or_else(|| DashboardError::InvalidTimestamp(value.clone())),
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum ReportFormat {
    Markdown,
    Json,
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    let result = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    if let Err(error) = result {
        eprintln!("failed to initialise logging: {error}");
    }
}

async fn connect() -> anyhow::Result<PgPool> {
    let database_url = std::env::var("DATABASE_URL")
        .context("DATABASE_URL must be set to the Supabase/Postgres instance")?;

    PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .context("failed to connect to Postgres")
}

/// Loads a fresh snapshot: dataset and roles from the chosen source, then CSV roles merged on top.
async fn load_state(
    source: &SourceArgs,
    now: DateTime<Utc>,
    horizon_hours: u32,
) -> anyhow::Result<DashboardState> {
    let mut state = DashboardState::new(
        Dataset::from_rows(&[], now),
        RoleMapping::new(),
        source.settings(),
    );

    match &source.csv {
        Some(path) => {
            let rows = ingest::read_rows(path)?;
            state.replace_dataset(Dataset::from_rows(&rows, now));
        }
        None => {
            let pool = connect().await?;
            let rows = db::fetch_rows(&pool, hours_before(now, horizon_hours)).await?;
            state.replace_dataset(Dataset::from_rows(&rows, now));
            state.replace_roles(db::fetch_roles(&pool).await?);
        }
    }

    if let Some(path) = &source.roles {
        state.merge_roles(ingest::read_role_mapping(path)?);
    }

    info!(
        records = state.records().len(),
        roles = state.roles().len(),
        "dataset loaded"
    );
    Ok(state)
}

fn print_summary(state: &DashboardState, now: DateTime<Utc>) {
    let records = state.records();
    let resolved = rankings::resolved_series(records, now);
    let escalations = rankings::escalation_series(records, state.roles(), now);

    if records.is_empty() {
        println!("No conversations found.");
        return;
    }

    println!("Conversation quality as of {}:", now.format("%Y-%m-%d %H:%M UTC"));
    for (resolved, escalations) in resolved.iter().zip(escalations.iter()) {
        let metrics = rankings::window_metrics(records, resolved.window, now);
        let avg = metrics
            .avg_total_score
            .map_or_else(|| "n/a".to_string(), |score| format!("{score:.2}"));
        println!(
            "- {}: {} conversations, avg score {}, resolved {}/{} ({:.1}%), tier escalations {} ({:.1}%), hand-offs {} ({:.1}%)",
            resolved.window,
            metrics.total_conversations,
            avg,
            resolved.value.count,
            resolved.value.total,
            resolved.value.percentage,
            escalations.value.tier_escalations,
            escalations.value.escalation_rate,
            escalations.value.handoffs,
            escalations.value.handoff_rate
        );
    }

    let recent = sentiment::recent_sentiment_breakdown(records, now);
    println!("Conversations in the last hour: {}", recent.total());
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    match cli.command {
        Commands::InitDb => {
            let pool = connect().await?;
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Import { csv } => {
            let pool = connect().await?;
            let rows = ingest::read_rows(&csv)?;
            let imported = db::import_rows(&pool, &rows).await?;
            println!("Imported {imported} conversations from {}.", csv.display());
        }
        Commands::ImportRoles { csv, merge } => {
            let pool = connect().await?;
            let mapping = ingest::read_role_mapping(&csv)?;
            let stored = if merge {
                db::merge_roles(&pool, &mapping).await?
            } else {
                db::replace_roles(&pool, &mapping).await?
            };
            println!(
                "{} {stored} role assignments from {}.",
                if merge { "Merged" } else { "Stored" },
                csv.display()
            );
        }
        Commands::Summary { source } => {
            let now = source.reference_time()?;
            let state = load_state(&source, now, Window::Days30.hours()).await?;
            print_summary(&state, now);
        }
        Commands::Report {
            source,
            window,
            format,
            out,
            limit,
            tip_hours,
        } => {
            let now = source.reference_time()?;
            let horizon_hours = Window::Days30.hours().max(tip_hours);
            let state = load_state(&source, now, horizon_hours).await?;
            let options = ReportOptions {
                top_n: limit,
                tip_hours,
                ..ReportOptions::default()
            };
            let report = report::build_report(&state, window, now, &options);
            let rendered = match format {
                ReportFormat::Markdown => report::render_markdown(&report),
                ReportFormat::Json => serde_json::to_string_pretty(&report)?,
            };
            std::fs::write(&out, rendered)
                .with_context(|| format!("failed to write {}", out.display()))?;
            println!("Report written to {}.", out.display());
        }
    }

    Ok(())
}
