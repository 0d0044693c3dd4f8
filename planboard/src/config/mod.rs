//! Configuration system for the `Planboard` client.
//!
//! Supports layered configuration with the following priority (highest first):
//! 1. CLI arguments
//! 2. Environment variables (via clap `env` attribute)
//! 3. TOML config file (`~/.config/planboard/config.toml`)
//! 4. Compiled defaults
//!
//! Missing config file is not an error (defaults are used). An explicit
//! `--config` path that doesn't exist is an error.

use std::path::PathBuf;

use chrono::FixedOffset;

use planboard_model::day::DayKey;
use planboard_model::task::{TaskCategory, TaskStatus};

use crate::board::TaskScope;
use crate::identity::{Identity, UserId};
use crate::store::Collections;

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadFile {
        /// Path that was attempted.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Failed to parse the TOML configuration.
    #[error("failed to parse config file: {0}")]
    ParseToml(#[from] toml::de::Error),

    /// A UTC offset was not of the form `±HH:MM`.
    #[error("invalid UTC offset {0:?} (expected +HH:MM or -HH:MM)")]
    InvalidOffset(String),
}

// ---------------------------------------------------------------------------
// TOML file structs (all fields Option for partial overrides)
// ---------------------------------------------------------------------------

/// Top-level TOML config file structure.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ConfigFile {
    store: StoreFileConfig,
    calendar: CalendarFileConfig,
    identity: IdentityFileConfig,
}

/// `[store]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct StoreFileConfig {
    tasks_collection: Option<String>,
    projects_collection: Option<String>,
}

/// `[calendar]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct CalendarFileConfig {
    utc_offset: Option<String>,
}

/// `[identity]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct IdentityFileConfig {
    user_id: Option<String>,
    display_name: Option<String>,
    image_url: Option<String>,
}

// ---------------------------------------------------------------------------
// Resolved configuration
// ---------------------------------------------------------------------------

/// Fully resolved client configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientConfig {
    /// Collection names.
    pub collections: Collections,
    /// Fixed UTC offset that defines a calendar day; `None` means the local
    /// time zone.
    pub utc_offset: Option<FixedOffset>,
    /// Signed-in user id; `None` means signed out.
    pub user_id: Option<String>,
    /// Display name of the signed-in user.
    pub display_name: Option<String>,
    /// Avatar URL of the signed-in user.
    pub image_url: Option<String>,
}

impl ClientConfig {
    /// Load configuration by merging CLI args, env vars, and a TOML file.
    ///
    /// If `--config` is given and the file does not exist, returns an error.
    /// If no `--config` is given, the default path
    /// (`~/.config/planboard/config.toml`) is tried and silently ignored if
    /// missing.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the config file cannot be read or parsed,
    /// or a UTC offset is malformed.
    pub fn load(cli: &CliArgs) -> Result<Self, ConfigError> {
        let file = load_config_file(cli.config.as_deref())?;
        Self::resolve(cli, &file)
    }

    /// Resolve a `ClientConfig` from CLI args and a parsed config file.
    ///
    /// Priority: CLI > file > default.
    fn resolve(cli: &CliArgs, file: &ConfigFile) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let utc_offset = cli
            .utc_offset
            .as_deref()
            .or(file.calendar.utc_offset.as_deref())
            .map(parse_utc_offset)
            .transpose()?;

        Ok(Self {
            collections: Collections {
                tasks: file
                    .store
                    .tasks_collection
                    .clone()
                    .unwrap_or(defaults.collections.tasks),
                projects: file
                    .store
                    .projects_collection
                    .clone()
                    .unwrap_or(defaults.collections.projects),
            },
            utc_offset,
            user_id: cli
                .user_id
                .clone()
                .or_else(|| file.identity.user_id.clone())
                .filter(|id| !id.is_empty()),
            display_name: file.identity.display_name.clone(),
            image_url: file.identity.image_url.clone(),
        })
    }

    /// The signed-in identity, if a user id is configured.
    ///
    /// The display name defaults to the user id.
    #[must_use]
    pub fn identity(&self) -> Option<Identity> {
        let id = self.user_id.clone()?;
        Some(Identity {
            display_name: self.display_name.clone().unwrap_or_else(|| id.clone()),
            id: UserId::new(id),
            image_url: self.image_url.clone(),
        })
    }
}

/// CLI arguments parsed by clap.
#[derive(clap::Parser, Debug, Default)]
#[command(version, about = "Realtime task and project board")]
pub struct CliArgs {
    /// Path to config file (default: `~/.config/planboard/config.toml`).
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Signed-in user id. Without one every board is empty.
    #[arg(long, env = "PLANBOARD_USER")]
    pub user_id: Option<String>,

    /// JSON fixture holding the store's documents.
    #[arg(long, env = "PLANBOARD_FIXTURE", default_value = "planboard.json")]
    pub fixture: PathBuf,

    /// UTC offset that defines a calendar day (`+07:00`); default local time.
    #[arg(long, allow_hyphen_values = true)]
    pub utc_offset: Option<String>,

    /// Log level filter (trace, debug, info, warn, error).
    #[arg(long, default_value = "info", env = "PLANBOARD_LOG")]
    pub log_level: String,

    /// Path to log file (default: stderr).
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// What to do; defaults to showing this week.
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Commands of the `planboard` binary.
#[derive(clap::Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Show the seven days around a day, with the tasks created on each.
    Week {
        /// Center day (`YYYY-MM-DD`); default today.
        #[arg(long)]
        day: Option<DayKey>,
    },
    /// Show every task still to do, with status counts.
    Todo,
    /// List projects with their member and task counts.
    Projects,
    /// Print the month picker grid.
    Month {
        /// Year.
        #[arg(long)]
        year: i32,
        /// Month (1-12).
        #[arg(long)]
        month: u32,
    },
    /// Create a task assigned to the signed-in user.
    AddTask {
        /// Title.
        title: String,
        /// Description.
        #[arg(long)]
        description: Option<String>,
        /// Category: work, study or personal.
        #[arg(long, default_value = "work")]
        category: TaskCategory,
        /// Owning project id.
        #[arg(long)]
        project: Option<String>,
        /// Scheduled day (`YYYY-MM-DD`).
        #[arg(long)]
        scheduled: Option<DayKey>,
    },
    /// Create a project with the signed-in user as its only member.
    AddProject {
        /// Title.
        title: String,
        /// Description.
        description: String,
    },
    /// Change a task's status (todo, in-progress, completed).
    SetStatus {
        /// Task id.
        id: String,
        /// New status.
        status: TaskStatus,
    },
    /// Delete a project and all of its tasks.
    DeleteProject {
        /// Project id.
        id: String,
    },
    /// Delete tasks whose project no longer exists.
    Repair,
}

impl Command {
    /// Which tasks the command reads.
    ///
    /// The week strip shows the user's own tasks; the todo list and the
    /// project task counts cover the whole collection.
    #[must_use]
    pub const fn task_scope(&self) -> TaskScope {
        match self {
            Self::Todo | Self::Projects => TaskScope::All,
            _ => TaskScope::Mine,
        }
    }

    /// Whether the command writes to the store.
    #[must_use]
    pub const fn mutates(&self) -> bool {
        matches!(
            self,
            Self::AddTask { .. }
                | Self::AddProject { .. }
                | Self::SetStatus { .. }
                | Self::DeleteProject { .. }
                | Self::Repair
        )
    }
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

/// Parse `+HH:MM`, `-HH:MM` or `Z`.
fn parse_utc_offset(raw: &str) -> Result<FixedOffset, ConfigError> {
    let invalid = || ConfigError::InvalidOffset(raw.to_string());
    if raw == "Z" {
        return FixedOffset::east_opt(0).ok_or_else(invalid);
    }
    let (sign, rest) = match raw.split_at_checked(1) {
        Some(("+", rest)) => (1, rest),
        Some(("-", rest)) => (-1, rest),
        _ => return Err(invalid()),
    };
    let (hours, minutes) = rest.split_once(':').ok_or_else(invalid)?;
    let two_digits = |part: &str| part.len() == 2 && part.bytes().all(|b| b.is_ascii_digit());
    if !two_digits(hours) || !two_digits(minutes) {
        return Err(invalid());
    }
    let hours: i32 = hours.parse().map_err(|_| invalid())?;
    let minutes: i32 = minutes.parse().map_err(|_| invalid())?;
    if minutes >= 60 {
        return Err(invalid());
    }
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60)).ok_or_else(invalid)
}

/// Load and parse a TOML config file.
///
/// If `explicit_path` is `Some`, the file must exist (error if not).
/// If `explicit_path` is `None`, the default path is tried and missing file
/// is treated as empty config.
fn load_config_file(explicit_path: Option<&std::path::Path>) -> Result<ConfigFile, ConfigError> {
    let path = if let Some(p) = explicit_path {
        let contents = std::fs::read_to_string(p).map_err(|e| ConfigError::ReadFile {
            path: p.to_path_buf(),
            source: e,
        })?;
        return Ok(toml::from_str(&contents)?);
    } else {
        let Some(config_dir) = dirs::config_dir() else {
            // No config dir available, use defaults.
            return Ok(ConfigFile::default());
        };
        config_dir.join("planboard").join("config.toml")
    };

    match std::fs::read_to_string(&path) {
        Ok(contents) => Ok(toml::from_str(&contents)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ConfigFile::default()),
        Err(e) => Err(ConfigError::ReadFile { path, source: e }),
    }
}
