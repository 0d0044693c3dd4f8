//! `planboard`: task and project board over a JSON fixture store.
//!
//! Loads the fixture into the in-memory store, opens the same live boards a
//! screen would, prints the requested view or performs one mutation, and
//! writes the fixture back after a mutation. Configuration via CLI flags,
//! environment variables, or config file (`~/.config/planboard/config.toml`).
//!
//! ```bash
//! # This week's tasks for user u1
//! planboard --user-id u1 --fixture board.json week
//!
//! # Delete a project and all of its tasks
//! PLANBOARD_USER=u1 planboard delete-project p1
//! ```

use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use chrono::{Local, TimeZone};
use clap::Parser;
use tracing_appender::non_blocking::WorkerGuard;

use planboard::board::{LoadState, ProjectBoard, TaskBoard, TaskScope};
use planboard::config::{CliArgs, ClientConfig, Command, ConfigError};
use planboard::fixture::{self, FixtureError};
use planboard::identity::{IdentityProvider, StaticIdentity, UserId};
use planboard::projector::calendar::{month_grid, start_of_day, week_window};
use planboard::projector::{Projector, SystemClock, TaskViews};
use planboard::store::memory::MemoryStore;
use planboard::subscriber::ChangeStreamSubscriber;
use planboard::tasks::{LocalMutationCoordinator, MutationError, NewProject, NewTask};
use planboard_model::day::DayKey;
use planboard_model::project::ProjectId;
use planboard_model::task::{Task, TaskId};

/// Failures reported by the binary.
#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Fixture(#[from] FixtureError),
    #[error(transparent)]
    Mutation(#[from] MutationError),
    #[error("subscription failed: {0}")]
    Board(String),
    #[error("{0}")]
    Usage(String),
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = CliArgs::parse();
    let _log_guard = init_logging(&cli.log_level, cli.log_file.as_deref());

    let result = match ClientConfig::load(&cli) {
        Ok(config) => match config.utc_offset {
            Some(offset) => run(&cli, &config, offset).await,
            None => run(&cli, &config, Local).await,
        },
        Err(e) => Err(e.into()),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "command failed");
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Initialize logging to stderr, or to `file_path` when given.
///
/// Returns a [`WorkerGuard`] for file logging that must be held until
/// shutdown to ensure all buffered log entries are flushed.
fn init_logging(level: &str, file_path: Option<&Path>) -> Option<WorkerGuard> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let Some(log_path) = file_path else {
        tracing_subscriber::fmt()
            .with_writer(std::io::stderr)
            .with_env_filter(env_filter)
            .init();
        return None;
    };

    let log_dir = log_path.parent()?;
    let file_name = log_path.file_name()?.to_str()?;

    let file_appender = tracing_appender::rolling::never(log_dir, file_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_env_filter(env_filter)
        .with_ansi(false)
        .init();

    Some(guard)
}

/// Everything a command needs, wired once per run.
struct Session<Tz: TimeZone> {
    config: ClientConfig,
    store: Arc<MemoryStore>,
    subscriber: ChangeStreamSubscriber<MemoryStore>,
    projector: Arc<Projector<SystemClock, Tz>>,
    user: Option<UserId>,
    tz: Tz,
}

impl<Tz> Session<Tz>
where
    Tz: TimeZone + Send + Sync + 'static,
{
    async fn task_views(&self, scope: TaskScope) -> Result<TaskViews, CliError> {
        let board = TaskBoard::open(
            &self.subscriber,
            Arc::clone(&self.projector),
            &self.config.collections,
            self.user.as_ref(),
            scope,
            None,
        );
        ready(board.wait_ready().await)
    }

    fn coordinator(&self) -> Result<LocalMutationCoordinator<MemoryStore>, CliError> {
        let user = self
            .user
            .clone()
            .ok_or_else(|| CliError::Usage("sign in with --user-id to make changes".into()))?;
        Ok(LocalMutationCoordinator::new(Arc::clone(&self.store), user)
            .with_collections(self.config.collections.clone()))
    }
}

async fn run<Tz>(cli: &CliArgs, config: &ClientConfig, tz: Tz) -> Result<(), CliError>
where
    Tz: TimeZone + Send + Sync + 'static,
{
    let identity = config
        .identity()
        .map_or_else(StaticIdentity::signed_out, StaticIdentity::signed_in);
    let store = Arc::new(fixture::load(&cli.fixture)?);
    let session = Session {
        config: config.clone(),
        subscriber: ChangeStreamSubscriber::new(Arc::clone(&store)),
        store,
        projector: Arc::new(Projector::with_parts(SystemClock, tz.clone())),
        user: identity.current_user().map(|u| u.id),
        tz,
    };
    tracing::info!(
        user = ?session.user,
        fixture = %cli.fixture.display(),
        "planboard starting"
    );

    let command = cli.command.clone().unwrap_or(Command::Week { day: None });
    let outcome = execute(&session, &command).await;

    // A partial cascade already changed the store; keep those deletes.
    let partial = matches!(&outcome, Err(CliError::Mutation(e)) if e.is_partial());
    if command.mutates() && (outcome.is_ok() || partial) {
        fixture::save(&session.store, &cli.fixture)?;
    }
    outcome?;
    let fallbacks = session.projector.fallback_count();
    if fallbacks > 0 {
        tracing::warn!(fallbacks, "tasks without a usable creation time were shown under today");
    }
    Ok(())
}

async fn execute<Tz>(session: &Session<Tz>, command: &Command) -> Result<(), CliError>
where
    Tz: TimeZone + Send + Sync + 'static,
{
    match command {
        Command::Week { day } => {
            let views = session.task_views(command.task_scope()).await?;
            let center = day.unwrap_or_else(|| session.projector.today());
            for key in week_window(center) {
                let marker = if key == center { " <" } else { "" };
                println!("{key}{marker}");
                views.on_day(&key).iter().for_each(print_task);
            }
        }
        Command::Todo => {
            let views = session.task_views(command.task_scope()).await?;
            let counts = views.counts;
            println!(
                "todo {} | in progress {} | completed {}",
                counts.todo, counts.in_progress, counts.completed
            );
            views.todo.iter().for_each(print_task);
        }
        Command::Projects => {
            let board = ProjectBoard::open(
                &session.subscriber,
                Arc::clone(&session.projector),
                &session.config.collections,
                session.user.as_ref(),
            );
            let projects = ready(board.wait_ready().await)?;
            let views = session.task_views(command.task_scope()).await?;
            for project in projects {
                let id = project.id.clone().unwrap_or_else(|| ProjectId::new("?"));
                println!(
                    "{id}  {}  members={} tasks={}",
                    project.title,
                    project.member_count(),
                    views.in_project(&id).len()
                );
            }
        }
        Command::Month { year, month } => {
            let grid = month_grid(*year, *month)
                .ok_or_else(|| CliError::Usage(format!("no such month: {year}-{month}")))?;
            println!("Su Mo Tu We Th Fr Sa");
            for week in grid.chunks(7) {
                let row: Vec<String> = week
                    .iter()
                    .map(|cell| {
                        if cell.in_month {
                            format!("{:>2}", chrono::Datelike::day(&cell.day.date()))
                        } else {
                            "  ".to_string()
                        }
                    })
                    .collect();
                println!("{}", row.join(" "));
            }
        }
        Command::AddTask {
            title,
            description,
            category,
            project,
            scheduled,
        } => {
            let input = NewTask {
                title: title.clone(),
                description: description.clone(),
                category: *category,
                project_id: project.clone().map(ProjectId::new),
                scheduled_at: scheduled.and_then(|day: DayKey| start_of_day(day, &session.tz)),
            };
            let id = session.coordinator()?.create_task(input).await?;
            println!("created task {id}");
        }
        Command::AddProject { title, description } => {
            let id = session
                .coordinator()?
                .create_project(NewProject {
                    title: title.clone(),
                    description: description.clone(),
                })
                .await?;
            println!("created project {id}");
        }
        Command::SetStatus { id, status } => {
            session
                .coordinator()?
                .update_status(&TaskId::new(id.as_str()), *status)
                .await?;
            println!("task {id} is now {status}");
        }
        Command::DeleteProject { id } => {
            let coordinator = session.coordinator()?;
            match coordinator.delete_project(&ProjectId::new(id.as_str())).await {
                Ok(tasks) => println!("deleted project {id} and {tasks} task(s)"),
                Err(e) if e.is_partial() => {
                    eprintln!("project {id} was only partly deleted; run `planboard repair`");
                    return Err(e.into());
                }
                Err(e) => return Err(e.into()),
            }
        }
        Command::Repair => {
            let report = session.coordinator()?.repair_orphans().await?;
            println!(
                "scanned {} task(s), deleted {} orphan(s)",
                report.scanned,
                report.deleted.len()
            );
            for (task, error) in &report.failed {
                println!("  could not delete {task}: {error}");
            }
        }
    }
    Ok(())
}

fn ready<T>(state: LoadState<T>) -> Result<T, CliError> {
    match state {
        LoadState::Ready(view) => Ok(view),
        LoadState::Failed(reason) => Err(CliError::Board(reason)),
        LoadState::Loading => Err(CliError::Board("no snapshot received".into())),
    }
}

fn print_task(task: &Task) {
    let id = task
        .id
        .as_ref()
        .map_or_else(|| "pending".to_string(), ToString::to_string);
    println!("  [{:<11}] {}  ({id})", task.status.as_str(), task.title);
}
