//! bugroute CLI: operator interface to the routing engine.

use bugroute::config::Config;
use bugroute::db::Db;
use bugroute::engine::{AssignOutcome, Assigner};
use bugroute::model::{
    NewWorkItem, NewWorker, Role, Severity, Status, WorkItemId, WorkerId, WorkerMetrics,
};
use bugroute::stress::HttpOracle;
use bugroute::telemetry::{TelemetryConfig, init_telemetry};
use clap::{Parser, Subcommand};
use secrecy::ExposeSecret;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "bugroute", about = "Stress-aware work item routing")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Apply pending database migrations
    Migrate,
    /// Work item operations
    Bug {
        #[command(subcommand)]
        action: BugAction,
    },
    /// Worker and metrics operations
    Worker {
        #[command(subcommand)]
        action: WorkerAction,
    },
    /// Predict stress for one worker
    Stress {
        /// Worker ID
        worker: i64,
    },
    /// Assign a work item: to the best-fit developer, or to `--to`
    Assign {
        /// Work item ID
        item: i64,
        /// Worker ID of whoever requested the assignment
        #[arg(long)]
        assigner: i64,
        /// Skip selection and assign to this worker (also reassigns)
        #[arg(long)]
        to: Option<i64>,
    },
    /// Show assignment history
    Assignments {
        /// Only this work item
        #[arg(long)]
        item: Option<i64>,
        #[arg(long, default_value_t = 20)]
        limit: i64,
    },
}

#[derive(Subcommand)]
enum BugAction {
    /// Report a new work item
    Create {
        title: String,
        /// LOW, MEDIUM, HIGH or CRITICAL
        #[arg(long, default_value = "MEDIUM")]
        severity: String,
        #[arg(long, default_value = "")]
        description: String,
        /// Reporter worker ID
        #[arg(long)]
        reporter: Option<i64>,
    },
    /// List work items
    List {
        /// Filter by status
        #[arg(long)]
        status: Option<String>,
        #[arg(long, default_value_t = 20)]
        limit: i64,
    },
    /// Show a work item
    Show { id: i64 },
    /// Close a work item
    Close { id: i64 },
}

#[derive(Subcommand)]
enum WorkerAction {
    /// Register a worker
    Add {
        name: String,
        email: String,
        /// ADMIN, MANAGER, DEVELOPER or REPORTER
        #[arg(long, default_value = "DEVELOPER")]
        role: String,
    },
    /// List workers with their metrics
    List,
    /// Create or replace a worker's metrics row
    Metrics {
        worker: i64,
        #[arg(long, default_value_t = 0)]
        open: u32,
        #[arg(long, default_value_t = 0.0)]
        avg_hours: f64,
        #[arg(long, default_value_t = 0.0)]
        stress: f64,
    },
    /// Record an observed stress score
    SetStress { worker: i64, score: f64 },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let config = Config::from_env()?;

    let _guard = init_telemetry(TelemetryConfig {
        endpoint: config.otel_endpoint.clone(),
        service_name: "bugroute".to_string(),
        log_level: config.log_level.clone(),
    })?;

    let db = Arc::new(Db::connect(config.database_url.expose_secret()).await?);
    db.migrate().await?;

    let result = run(&db, &config, cli.command).await;
    db.close().await;
    result
}

async fn run(db: &Arc<Db>, config: &Config, command: Command) -> anyhow::Result<()> {
    match command {
        Command::Migrate => println!("Migrations applied."),
        Command::Bug { action } => cmd_bug(db, action).await?,
        Command::Worker { action } => cmd_worker(db, action).await?,
        Command::Stress { worker } => {
            let engine = Assigner::new(Arc::clone(db), oracle_from(config)?);
            let prediction = engine.predictor().predict(WorkerId(worker)).await?;
            println!(
                "Worker {worker}: predicted stress {:.4} ({})",
                prediction.score, prediction.source
            );
        }
        Command::Assign { item, assigner, to } => match to {
            Some(to) => cmd_assign_to(db, WorkItemId(item), WorkerId(to), WorkerId(assigner)).await?,
            None => cmd_assign(db, config, WorkItemId(item), WorkerId(assigner)).await?,
        },
        Command::Assignments { item, limit } => {
            let records = db.list_assignments(item.map(WorkItemId), limit).await?;
            if records.is_empty() {
                println!("No assignments found.");
            }
            for r in &records {
                println!(
                    "#{:<6} item {:<6} -> worker {:<6} by {:<6} at {}",
                    r.id,
                    r.work_item,
                    r.assignee,
                    r.assigner,
                    r.assigned_at.format("%Y-%m-%d %H:%M")
                );
            }
        }
    }
    Ok(())
}

fn oracle_from(config: &Config) -> anyhow::Result<Option<HttpOracle>> {
    Ok(match &config.oracle {
        Some(oracle) => Some(HttpOracle::with_timeout(&oracle.url, oracle.timeout)?),
        None => None,
    })
}

async fn cmd_assign(
    db: &Arc<Db>,
    config: &Config,
    item: WorkItemId,
    assigner: WorkerId,
) -> anyhow::Result<()> {
    // Use-case checks live here, not in the engine.
    let current = db.get_work_item(item).await?;
    if current.status != Status::Open {
        anyhow::bail!("work item {item} is {}, only OPEN items can be auto-assigned", current.status);
    }
    db.get_worker(assigner).await?;

    let engine = Assigner::new(Arc::clone(db), oracle_from(config)?);
    match engine.auto_assign(item, assigner).await? {
        AssignOutcome::NoCandidates => {
            println!("No developer candidates available; item {item} left unassigned.");
        }
        AssignOutcome::Assigned(assignment) => {
            let chosen = &assignment.scoring;
            println!(
                "Assigned item {item} to {} <{}> (worker {})",
                chosen.worker.name, chosen.worker.email, chosen.worker.id
            );
            println!();
            println!(
                "{:<8}  {:<20}  {:>5}  {:>8}  {:>7}  {:<20}  {:>9}",
                "WORKER", "NAME", "OPEN", "AVG_RES", "STRESS", "SOURCE", "COMPOSITE"
            );
            println!("{}", "-".repeat(88));
            for c in &assignment.ranking {
                println!(
                    "{:<8}  {:<20}  {:>5}  {:>7.1}h  {:>7.3}  {:<20}  {:>9.4}",
                    c.worker.id,
                    c.worker.name,
                    c.metrics.open_item_count,
                    c.metrics.avg_resolution_time_hours,
                    c.prediction.score,
                    c.prediction.source,
                    c.composite
                );
            }
        }
    }
    Ok(())
}

async fn cmd_assign_to(
    db: &Arc<Db>,
    item: WorkItemId,
    assignee: WorkerId,
    assigner: WorkerId,
) -> anyhow::Result<()> {
    let current = db.get_work_item(item).await?;
    if !current.status.can_transition_to(Status::InProgress) {
        anyhow::bail!("work item {item} is {}, only OPEN or IN_PROGRESS items can be assigned", current.status);
    }
    let worker = db.get_worker(assignee).await?;
    db.get_worker(assigner).await?;

    // No oracle needed: selection is skipped.
    let engine = Assigner::new(Arc::clone(db), None);
    let record = engine.assign_to(item, assignee, assigner).await?;
    match current.assignee {
        Some(previous) if previous != assignee => println!(
            "Reassigned item {item} from worker {previous} to {} <{}> (record #{})",
            worker.name, worker.email, record.id
        ),
        _ => println!(
            "Assigned item {item} to {} <{}> (record #{})",
            worker.name, worker.email, record.id
        ),
    }
    Ok(())
}

async fn cmd_bug(db: &Db, action: BugAction) -> anyhow::Result<()> {
    match action {
        BugAction::Create {
            title,
            severity,
            description,
            reporter,
        } => {
            let severity: Severity = severity.parse()?;
            let mut new = NewWorkItem::new(title, severity).description(description);
            if let Some(reporter) = reporter {
                new = new.reporter(WorkerId(reporter));
            }
            let item = db.create_work_item(new).await?;
            println!("Created: {} (status: {})", item.id, item.status);
        }
        BugAction::List { status, limit } => {
            let status: Option<Status> = status.map(|s| s.parse()).transpose()?;
            let items = db.list_work_items(status, limit).await?;
            if items.is_empty() {
                println!("No work items found.");
                return Ok(());
            }
            println!(
                "{:<6}  {:<9}  {:<12}  {:<8}  {:<40}  CREATED",
                "ID", "SEVERITY", "STATUS", "ASSIGNEE", "TITLE"
            );
            println!("{}", "-".repeat(100));
            for item in &items {
                let assignee = item
                    .assignee
                    .map(|a| a.to_string())
                    .unwrap_or_else(|| "-".to_string());
                let title: String = item.title.chars().take(40).collect();
                println!(
                    "{:<6}  {:<9}  {:<12}  {:<8}  {:<40}  {}",
                    item.id,
                    item.severity,
                    item.status,
                    assignee,
                    title,
                    item.created_at.format("%Y-%m-%d %H:%M")
                );
            }
            println!("\n{} item(s)", items.len());
        }
        BugAction::Show { id } => {
            let item = db.get_work_item(WorkItemId(id)).await?;
            println!("ID:          {}", item.id);
            println!("Title:       {}", item.title);
            println!("Severity:    {}", item.severity);
            println!("Status:      {}", item.status);
            println!(
                "Assignee:    {}",
                item.assignee.map(|a| a.to_string()).unwrap_or("-".into())
            );
            println!(
                "Reporter:    {}",
                item.reporter.map(|r| r.to_string()).unwrap_or("-".into())
            );
            println!("Created:     {}", item.created_at);
            println!("Updated:     {}", item.updated_at);
            if let Some(closed) = item.closed_at {
                println!("Closed:      {closed}");
            }
            if !item.description.is_empty() {
                println!("---\n{}", item.description);
            }
        }
        BugAction::Close { id } => {
            let item = db.close_work_item(WorkItemId(id)).await?;
            println!("Closed: {}", item.id);
        }
    }
    Ok(())
}

async fn cmd_worker(db: &Db, action: WorkerAction) -> anyhow::Result<()> {
    match action {
        WorkerAction::Add { name, email, role } => {
            let role: Role = role.parse()?;
            let worker = db.create_worker(NewWorker::new(name, email, role)).await?;
            println!("Created: worker {} ({})", worker.id, worker.role);
        }
        WorkerAction::List => {
            let workers = db.list_workers().await?;
            println!(
                "{:<6}  {:<20}  {:<10}  {:>5}  {:>8}  {:>6}",
                "ID", "NAME", "ROLE", "OPEN", "AVG_RES", "STRESS"
            );
            println!("{}", "-".repeat(64));
            for (worker, metrics) in &workers {
                match metrics {
                    Some(m) => println!(
                        "{:<6}  {:<20}  {:<10}  {:>5}  {:>7.1}h  {:>6.2}",
                        worker.id,
                        worker.name,
                        worker.role,
                        m.open_item_count,
                        m.avg_resolution_time_hours,
                        m.current_stress_score
                    ),
                    None => println!(
                        "{:<6}  {:<20}  {:<10}  {:>5}  {:>8}  {:>6}",
                        worker.id, worker.name, worker.role, "-", "-", "-"
                    ),
                }
            }
        }
        WorkerAction::Metrics {
            worker,
            open,
            avg_hours,
            stress,
        } => {
            db.upsert_metrics(WorkerId(worker), WorkerMetrics::new(open, avg_hours, stress))
                .await?;
            println!("Metrics updated for worker {worker}.");
        }
        WorkerAction::SetStress { worker, score } => {
            db.update_stress_score(WorkerId(worker), score).await?;
            println!("Stress score for worker {worker} set to {score}.");
        }
    }
    Ok(())
}
