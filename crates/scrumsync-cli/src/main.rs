//! ScrumSync - dual-store Scrum artifact manager CLI
//!
//! The `scrumsync` command drives the reconciliation engine against the
//! relational API and the ledger signing bridge.
//!
//! ## Commands
//!
//! - `team` / `backlog` / `sprint` / `task`: manage one entity family
//! - `sync-all`: bulk-sync every unsynced entity of a kind in a team
//! - `audit`: ledger operation history and administrative purge

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand, ValueEnum};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::Level;

use scrumsync_core::{
    init_tracing, sync_state_of, AuditFilter, AuditLog, AuditOutcome, BacklogItem, BacklogStatus,
    EntityKind, LedgerMiss, LocalId, Priority, RelationalStore, ScrumEntity, Sprint, SprintStatus,
    StoredEntity, SyncOrchestrator, SyncOutcome, Task, TaskStatus, Team, TeamStatus,
};
use scrumsync_stores::{
    ApiConfig, HttpAuditLog, HttpRelationalStore, SignerBridgeGateway, SignerConfig,
};

#[derive(Parser)]
#[command(name = "scrumsync")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Scrum artifacts with a ledger-backed audit trail", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Entity kinds accepted on the command line.
#[derive(Debug, Clone, Copy, ValueEnum)]
enum KindArg {
    Team,
    Backlog,
    Sprint,
    Task,
}

impl From<KindArg> for EntityKind {
    fn from(arg: KindArg) -> Self {
        match arg {
            KindArg::Team => EntityKind::Team,
            KindArg::Backlog => EntityKind::BacklogItem,
            KindArg::Sprint => EntityKind::Sprint,
            KindArg::Task => EntityKind::Task,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Manage teams
    Team {
        #[command(subcommand)]
        action: TeamAction,
    },

    /// Manage backlog items
    Backlog {
        #[command(subcommand)]
        action: BacklogAction,
    },

    /// Manage sprints
    Sprint {
        #[command(subcommand)]
        action: SprintAction,
    },

    /// Manage tasks
    Task {
        #[command(subcommand)]
        action: TaskAction,
    },

    /// Retry the ledger leg for one entity without re-entering data
    Sync {
        /// Entity kind
        kind: KindArg,
        /// Relational id
        id: i64,
    },

    /// Bulk-sync every unsynced entity of a kind in a team
    SyncAll {
        /// Entity kind
        kind: KindArg,
        /// Owning team id
        #[arg(long)]
        team: i64,
    },

    /// Ledger operation history
    Audit {
        #[command(subcommand)]
        action: AuditAction,
    },
}

#[derive(Subcommand)]
enum TeamAction {
    /// Create a team and register it on the ledger
    Create {
        #[arg(long)]
        name: String,
        #[arg(long, default_value = "")]
        description: String,
    },
    /// List teams with their sync state
    List,
    /// Change a team's status (active/archived)
    Status { id: i64, status: String },
    /// Delete a team (relational delete + best-effort ledger removal)
    Remove { id: i64 },
}

#[derive(Subcommand)]
enum BacklogAction {
    /// Add a backlog item
    Add {
        #[arg(long)]
        team: i64,
        #[arg(long)]
        title: String,
        #[arg(long, default_value = "")]
        description: String,
        #[arg(long, default_value = "medium")]
        priority: String,
    },
    /// Update a backlog item's fields
    Update {
        id: i64,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        priority: Option<String>,
    },
    /// Change a backlog item's status
    Status { id: i64, status: String },
    /// Delete a backlog item
    Remove { id: i64 },
    /// List a team's backlog items
    List {
        #[arg(long)]
        team: i64,
    },
}

#[derive(Subcommand)]
enum SprintAction {
    /// Add a sprint
    Add {
        #[arg(long)]
        team: i64,
        #[arg(long)]
        name: String,
        #[arg(long, default_value = "")]
        goal: String,
        /// First day (YYYY-MM-DD)
        #[arg(long)]
        starts_on: String,
        /// Last day (YYYY-MM-DD)
        #[arg(long)]
        ends_on: String,
    },
    /// Change a sprint's status
    Status { id: i64, status: String },
    /// Delete a sprint
    Remove { id: i64 },
    /// List a team's sprints
    List {
        #[arg(long)]
        team: i64,
    },
}

#[derive(Subcommand)]
enum TaskAction {
    /// Add a task
    Add {
        #[arg(long)]
        team: i64,
        #[arg(long)]
        title: String,
        #[arg(long, default_value = "")]
        description: String,
        #[arg(long)]
        assignee: Option<String>,
    },
    /// Update a task's fields
    Update {
        id: i64,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        assignee: Option<String>,
    },
    /// Change a task's status
    Status { id: i64, status: String },
    /// Delete a task
    Remove { id: i64 },
    /// List a team's tasks
    List {
        #[arg(long)]
        team: i64,
    },
}

#[derive(Subcommand)]
enum AuditAction {
    /// Show ledger operation history (newest first)
    History {
        #[arg(long)]
        kind: Option<KindArg>,
        /// Contract method (register/update_fingerprint/change_status/remove)
        #[arg(long)]
        method: Option<String>,
        /// Outcome filter (confirmed/declined/unavailable/reverted)
        #[arg(long)]
        outcome: Option<String>,
        #[arg(long, default_value = "0")]
        offset: usize,
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },
    /// Purge the whole audit log (administrative, no ledger-side effect)
    Purge {
        /// Confirm the destructive purge
        #[arg(long)]
        yes: bool,
    },
}

/// Parse a snake_case label into one of the serde enums.
fn parse_label<T: DeserializeOwned>(label: &str, what: &str) -> Result<T> {
    serde_json::from_value(Value::String(label.to_string()))
        .with_context(|| format!("unknown {what}: '{label}'"))
}

struct App {
    engine: SyncOrchestrator,
    relational: Arc<HttpRelationalStore>,
    audit: Arc<HttpAuditLog>,
}

fn app() -> App {
    let api = ApiConfig::from_env();
    let relational = Arc::new(HttpRelationalStore::new(api.clone()));
    let audit = Arc::new(HttpAuditLog::new(api));
    let ledger = Arc::new(SignerBridgeGateway::new(SignerConfig::from_env()));
    let engine = SyncOrchestrator::new(relational.clone(), ledger, audit.clone());
    App {
        engine,
        relational,
        audit,
    }
}

fn render_outcome(outcome: &SyncOutcome) {
    let report = outcome.report();
    let entity = &report.entity;
    match outcome {
        SyncOutcome::Success(_) => {
            println!(
                "{} {} ok [{}]",
                entity.kind, entity.local_id, report.sync_state
            );
            if let Some(receipt) = &report.receipt {
                println!(
                    "Ledger:  ref {} (block {}, fee {})",
                    receipt.confirmed_ref, receipt.block, receipt.cost
                );
            }
        }
        SyncOutcome::Partial { reason, .. } => {
            println!(
                "{} {} PARTIAL [{}]: saved locally, ledger step did not complete",
                entity.kind, entity.local_id, report.sync_state
            );
            println!("Reason:  {reason}");
            match reason {
                LedgerMiss::TeamNotSynced { team } => {
                    println!("Hint:    run 'scrumsync sync team {team}' first");
                }
                LedgerMiss::Unavailable(_) => {
                    println!("Hint:    check the signing bridge and retry with 'scrumsync sync'");
                }
                _ => {}
            }
        }
    }
}

fn render_rows(rows: &[StoredEntity]) {
    if rows.is_empty() {
        println!("(none)");
        return;
    }
    for row in rows {
        let state = sync_state_of(row)
            .map(|s| s.as_str().to_string())
            .unwrap_or_else(|_| "?".to_string());
        let label = scrumsync_core::entity_label(&row.fields);
        let ledger_ref = row
            .ledger_ref
            .as_ref()
            .map(|r| r.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:>5}  {:<24} [{:<8}] ledger:{}",
            row.local_id, label, state, ledger_ref
        );
    }
}

/// Fetch a row and apply optional field overrides, returning the merged
/// fields body for an update.
async fn patched_fields(
    relational: &HttpRelationalStore,
    kind: EntityKind,
    id: i64,
    patch: &[(&str, Option<String>)],
) -> Result<Value> {
    let row = relational
        .fetch(kind, LocalId(id))
        .await
        .with_context(|| format!("fetching {kind} {id}"))?;
    let mut fields = row.fields;
    let obj = fields
        .as_object_mut()
        .context("entity fields are not a JSON object")?;
    for (key, value) in patch {
        if let Some(value) = value {
            obj.insert((*key).to_string(), Value::String(value.clone()));
        }
    }
    Ok(fields)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    init_tracing(cli.json, level);

    let app = app();

    match cli.command {
        Commands::Team { action } => cmd_team(&app, action).await,
        Commands::Backlog { action } => cmd_backlog(&app, action).await,
        Commands::Sprint { action } => cmd_sprint(&app, action).await,
        Commands::Task { action } => cmd_task(&app, action).await,
        Commands::Sync { kind, id } => {
            let outcome = app.engine.sync(kind.into(), LocalId(id)).await?;
            render_outcome(&outcome);
            Ok(())
        }
        Commands::SyncAll { kind, team } => cmd_sync_all(&app, kind.into(), team).await,
        Commands::Audit { action } => cmd_audit(&app, action).await,
    }
}

async fn cmd_team(app: &App, action: TeamAction) -> Result<()> {
    match action {
        TeamAction::Create { name, description } => {
            let team = Team {
                name,
                description,
                status: TeamStatus::Active,
            };
            team.validate()?;
            let outcome = app.engine.create(EntityKind::Team, None, team.fields()?).await?;
            render_outcome(&outcome);
        }
        TeamAction::List => {
            let rows = app.relational.list(EntityKind::Team, None).await?;
            render_rows(&rows);
        }
        TeamAction::Status { id, status } => {
            parse_label::<TeamStatus>(&status, "team status")?;
            let outcome = app
                .engine
                .change_status(EntityKind::Team, LocalId(id), &status)
                .await?;
            render_outcome(&outcome);
        }
        TeamAction::Remove { id } => {
            let outcome = app.engine.remove(EntityKind::Team, LocalId(id)).await?;
            render_outcome(&outcome);
        }
    }
    Ok(())
}

async fn cmd_backlog(app: &App, action: BacklogAction) -> Result<()> {
    match action {
        BacklogAction::Add {
            team,
            title,
            description,
            priority,
        } => {
            let item = BacklogItem {
                title,
                description,
                priority: parse_label::<Priority>(&priority, "priority")?,
                status: BacklogStatus::New,
            };
            item.validate()?;
            let outcome = app
                .engine
                .create(EntityKind::BacklogItem, Some(LocalId(team)), item.fields()?)
                .await?;
            render_outcome(&outcome);
        }
        BacklogAction::Update {
            id,
            title,
            description,
            priority,
        } => {
            if let Some(p) = &priority {
                parse_label::<Priority>(p, "priority")?;
            }
            let fields = patched_fields(
                &app.relational,
                EntityKind::BacklogItem,
                id,
                &[
                    ("title", title),
                    ("description", description),
                    ("priority", priority),
                ],
            )
            .await?;
            let outcome = app
                .engine
                .update(EntityKind::BacklogItem, LocalId(id), fields)
                .await?;
            render_outcome(&outcome);
        }
        BacklogAction::Status { id, status } => {
            parse_label::<BacklogStatus>(&status, "backlog status")?;
            let outcome = app
                .engine
                .change_status(EntityKind::BacklogItem, LocalId(id), &status)
                .await?;
            render_outcome(&outcome);
        }
        BacklogAction::Remove { id } => {
            let outcome = app
                .engine
                .remove(EntityKind::BacklogItem, LocalId(id))
                .await?;
            render_outcome(&outcome);
        }
        BacklogAction::List { team } => {
            let rows = app
                .relational
                .list(EntityKind::BacklogItem, Some(LocalId(team)))
                .await?;
            render_rows(&rows);
        }
    }
    Ok(())
}

async fn cmd_sprint(app: &App, action: SprintAction) -> Result<()> {
    match action {
        SprintAction::Add {
            team,
            name,
            goal,
            starts_on,
            ends_on,
        } => {
            let sprint = Sprint {
                name,
                goal,
                starts_on: parse_date(&starts_on)?,
                ends_on: parse_date(&ends_on)?,
                status: SprintStatus::Planning,
            };
            sprint.validate()?;
            let outcome = app
                .engine
                .create(EntityKind::Sprint, Some(LocalId(team)), sprint.fields()?)
                .await?;
            render_outcome(&outcome);
        }
        SprintAction::Status { id, status } => {
            parse_label::<SprintStatus>(&status, "sprint status")?;
            let outcome = app
                .engine
                .change_status(EntityKind::Sprint, LocalId(id), &status)
                .await?;
            render_outcome(&outcome);
        }
        SprintAction::Remove { id } => {
            let outcome = app.engine.remove(EntityKind::Sprint, LocalId(id)).await?;
            render_outcome(&outcome);
        }
        SprintAction::List { team } => {
            let rows = app
                .relational
                .list(EntityKind::Sprint, Some(LocalId(team)))
                .await?;
            render_rows(&rows);
        }
    }
    Ok(())
}

async fn cmd_task(app: &App, action: TaskAction) -> Result<()> {
    match action {
        TaskAction::Add {
            team,
            title,
            description,
            assignee,
        } => {
            let task = Task {
                title,
                description,
                assignee,
                status: TaskStatus::Todo,
            };
            task.validate()?;
            let outcome = app
                .engine
                .create(EntityKind::Task, Some(LocalId(team)), task.fields()?)
                .await?;
            render_outcome(&outcome);
        }
        TaskAction::Update {
            id,
            title,
            description,
            assignee,
        } => {
            let fields = patched_fields(
                &app.relational,
                EntityKind::Task,
                id,
                &[
                    ("title", title),
                    ("description", description),
                    ("assignee", assignee),
                ],
            )
            .await?;
            let outcome = app
                .engine
                .update(EntityKind::Task, LocalId(id), fields)
                .await?;
            render_outcome(&outcome);
        }
        TaskAction::Status { id, status } => {
            parse_label::<TaskStatus>(&status, "task status")?;
            let outcome = app
                .engine
                .change_status(EntityKind::Task, LocalId(id), &status)
                .await?;
            render_outcome(&outcome);
        }
        TaskAction::Remove { id } => {
            let outcome = app.engine.remove(EntityKind::Task, LocalId(id)).await?;
            render_outcome(&outcome);
        }
        TaskAction::List { team } => {
            let rows = app
                .relational
                .list(EntityKind::Task, Some(LocalId(team)))
                .await?;
            render_rows(&rows);
        }
    }
    Ok(())
}

async fn cmd_sync_all(app: &App, kind: EntityKind, team: i64) -> Result<()> {
    let results = app.engine.sync_all(kind, LocalId(team)).await?;
    if results.is_empty() {
        println!("Nothing to sync: every {kind} in team {team} is up to date");
        return Ok(());
    }

    let mut synced = 0usize;
    let mut partial = 0usize;
    let mut failed = 0usize;
    for (id, result) in results {
        match result {
            Ok(outcome) if outcome.is_success() => {
                synced += 1;
                println!("  {kind} {id}: ok");
            }
            Ok(outcome) => {
                partial += 1;
                let reason = outcome
                    .partial_reason()
                    .map(|r| r.to_string())
                    .unwrap_or_default();
                println!("  {kind} {id}: partial ({reason})");
            }
            Err(err) => {
                failed += 1;
                println!("  {kind} {id}: FAILED ({err})");
            }
        }
    }
    println!("Synced {synced}, partial {partial}, failed {failed}");
    Ok(())
}

async fn cmd_audit(app: &App, action: AuditAction) -> Result<()> {
    match action {
        AuditAction::History {
            kind,
            method,
            outcome,
            offset,
            limit,
        } => {
            let filter = AuditFilter {
                kind: kind.map(EntityKind::from),
                method,
                outcome: outcome
                    .map(|o| parse_label::<AuditOutcome>(&o, "audit outcome"))
                    .transpose()?,
            };
            let page = app.audit.query(filter, offset, limit).await?;
            if page.records.is_empty() {
                println!("No matching audit records");
                return Ok(());
            }
            for record in &page.records {
                println!(
                    "{}  {:<11} {:<18} {} {}  {}",
                    record.recorded_at.format("%Y-%m-%d %H:%M:%S"),
                    record.outcome,
                    record.method,
                    record.kind,
                    record.local_id,
                    record.description,
                );
            }
            println!(
                "Showing {} of {} record(s), offset {}",
                page.records.len(),
                page.total,
                page.offset
            );
        }
        AuditAction::Purge { yes } => {
            if !yes {
                bail!("refusing to purge the audit log without --yes");
            }
            let removed = app.audit.purge().await?;
            println!("Purged {removed} audit record(s)");
        }
    }
    Ok(())
}

fn parse_date(raw: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .with_context(|| format!("invalid date '{raw}', expected YYYY-MM-DD"))
}
