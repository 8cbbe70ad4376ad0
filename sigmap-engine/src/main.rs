//! sigmap - Command-line entry point
//!
//! Normalizes point labels, imports parsed equipment and signatures into the
//! SQLite store, and drives the auto-assignment orchestrator over it.
//! Results are printed as pretty JSON on stdout; logs go to stderr.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

use sigmap_common::config::EngineConfig;
use sigmap_common::events::EventBus;
use sigmap_common::logging::init_tracing;
use sigmap_common::models::{Equipment, Point, PointKind, Signature};
use sigmap_engine::assignment::types::{BatchOptions, FeedbackRequest, RollbackRequest};
use sigmap_engine::{AssignmentError, AutoAssignmentOrchestrator, PointNormalizer, SqliteRepository};
use sigmap_engine::SignatureRepository;

/// Command-line arguments for sigmap
#[derive(Parser, Debug)]
#[command(name = "sigmap")]
#[command(about = "BACnet point normalization and equipment signature matching")]
#[command(version)]
struct Args {
    /// Configuration file (TOML)
    #[arg(short, long, env = "SIGMAP_CONFIG")]
    config: Option<PathBuf>,

    /// SQLite database file (overrides the configuration)
    #[arg(short, long)]
    database: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Normalize a single point label
    Normalize {
        label: String,
        #[arg(long)]
        vendor: Option<String>,
        #[arg(long)]
        equipment_type: Option<String>,
        #[arg(long)]
        unit: Option<String>,
        #[arg(long)]
        writable: bool,
    },
    /// Load parsed equipment and signatures from a JSON file
    Import { file: PathBuf },
    /// Run auto-assignment over every stored equipment item
    Batch {
        #[arg(long)]
        dry_run: bool,
        #[arg(long)]
        max: Option<usize>,
        #[arg(long)]
        user: Option<String>,
    },
    /// Run a learning cycle and print the verified pool
    Learn,
    /// Print high-confidence recommendations for unassigned equipment
    Recommend {
        #[arg(long, default_value = "20")]
        limit: usize,
    },
    /// Assign a signature by hand
    Assign {
        equipment_id: String,
        signature_id: String,
        #[arg(long, default_value = "anonymous")]
        user: String,
    },
    /// Record feedback from a JSON request body
    Feedback { body: String },
    /// Roll back an assignment from a JSON request body
    Rollback { body: String },
    /// Print assignment and learning metrics
    Metrics,
}

/// Import file layout
#[derive(Debug, Default, Deserialize, Serialize)]
struct ImportFile {
    #[serde(default)]
    equipment: Vec<Equipment>,
    #[serde(default)]
    signatures: Vec<Signature>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config =
        EngineConfig::load(args.config.as_deref()).context("Failed to load configuration")?;
    if let Some(path) = &args.database {
        config.database.path = path.clone();
    }
    init_tracing(&config.logging).context("Failed to initialize tracing")?;

    if let Command::Normalize {
        label,
        vendor,
        equipment_type,
        unit,
        writable,
    } = &args.command
    {
        let normalizer = PointNormalizer::new(&config.normalization)
            .context("Failed to load normalization rules")?;
        let mut point = Point::new(label.clone(), PointKind::Numeric);
        point.unit = unit.clone();
        point.writable = *writable;
        let result = normalizer.normalize(&point, vendor.as_deref(), equipment_type.as_deref());
        return print_json(&result);
    }

    let repo = Arc::new(
        SqliteRepository::connect(&config.database.path)
            .await
            .context("Failed to open database")?,
    );
    info!("Database: {}", config.database.path.display());

    if let Command::Import { file } = &args.command {
        return import(repo.as_ref(), &config, file).await;
    }

    let orchestrator =
        AutoAssignmentOrchestrator::from_config(repo.clone(), &config, EventBus::default());
    orchestrator
        .initialize()
        .await
        .context("Failed to initialize orchestrator")?;

    match args.command {
        Command::Normalize { .. } | Command::Import { .. } => Ok(()),
        Command::Batch { dry_run, max, user } => {
            let equipment = repo.list_equipment().await?;
            let options = BatchOptions {
                dry_run,
                max_assignments: max,
                user_id: user,
            };
            let result = orchestrator
                .batch_process_equipment(&equipment, &options)
                .await?;
            print_json(&result)
        }
        Command::Learn => {
            orchestrator.update_signature_learning().await?;
            print_json(&orchestrator.get_verified_signature_pool().await)
        }
        Command::Recommend { limit } => {
            print_json(&orchestrator.get_auto_assignment_recommendations(limit).await?)
        }
        Command::Assign {
            equipment_id,
            signature_id,
            user,
        } => print_json(
            &orchestrator
                .assign_manually(&equipment_id, &signature_id, &user)
                .await?,
        ),
        Command::Feedback { body } => {
            let request = FeedbackRequest::from_json(&parse_body(&body)?)?;
            let result = orchestrator
                .record_user_feedback(
                    &request.equipment_id,
                    &request.signature_id,
                    request.confirmed,
                    &request.user_id,
                    request.notes.as_deref(),
                )
                .await?;
            print_json(&result)
        }
        Command::Rollback { body } => {
            let request = RollbackRequest::from_json(&parse_body(&body)?)?;
            let result = orchestrator
                .rollback_assignment(
                    &request.equipment_id,
                    &request.signature_id,
                    &request.reason,
                    &request.user_id,
                )
                .await?;
            print_json(&result)
        }
        Command::Metrics => print_json(&orchestrator.get_performance_metrics().await?),
    }
}

/// Normalize and store equipment, then create or replace signatures
async fn import(repo: &SqliteRepository, config: &EngineConfig, file: &Path) -> Result<()> {
    let content = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let parsed: ImportFile = serde_json::from_str(&content)
        .with_context(|| format!("Invalid import file {}", file.display()))?;

    let normalizer = PointNormalizer::new(&config.normalization)
        .context("Failed to load normalization rules")?;

    for mut equipment in parsed.equipment.iter().cloned() {
        normalizer.normalize_equipment(&mut equipment);
        repo.save_equipment(&equipment).await?;
    }

    let mut created = 0;
    let mut replaced = 0;
    for signature in &parsed.signatures {
        match repo.create_signature(signature).await.map_err(AssignmentError::from) {
            Ok(()) => created += 1,
            Err(AssignmentError::Conflict(_)) => {
                repo.update_signature(signature).await?;
                replaced += 1;
            }
            Err(e) => return Err(e.into()),
        }
    }

    info!(
        equipment = parsed.equipment.len(),
        created, replaced, "Import complete"
    );
    print_json(&json!({
        "equipment": parsed.equipment.len(),
        "signatures_created": created,
        "signatures_replaced": replaced,
    }))
}

fn parse_body(body: &str) -> Result<serde_json::Value> {
    serde_json::from_str(body).context("Request body is not valid JSON")
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
