use std::{
    error::Error,
    fmt::{self, Display},
};
use thiserror::Error;

use crate::engine::CommandDiagnostic;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// The result of a berth-related operation.
pub type BerthResult<T> = Result<T, BerthError>;

/// An error that occurred during a deployment or lifecycle operation.
#[derive(Debug, Error)]
pub enum BerthError {
    /// An I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// An error that can represent any error.
    #[error(transparent)]
    Custom(#[from] AnyError),

    /// An error that occurred during a database operation.
    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),

    /// An error that occurred while running database migrations.
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// An error that occurred while parsing or writing a YAML document.
    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// An error that occurred while parsing or writing JSON.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// An error that occurred when a join handle returned an error.
    #[error("join error: {0}")]
    JoinError(#[from] tokio::task::JoinError),

    /// An error that occurred when an app identifier failed validation.
    #[error("invalid app identifier: {0}")]
    InvalidAppId(String),

    /// An error that occurred when an invalid port mapping was used.
    #[error("invalid port mapping: {0}")]
    InvalidPortMapping(String),

    /// An error that occurred when an invalid volume mapping was used.
    #[error("invalid volume mapping: {0}")]
    InvalidVolumeMapping(String),

    /// An error that occurred when an invalid environment variable entry was used.
    #[error("invalid environment variable: {0}")]
    InvalidEnvVar(String),

    /// An error that occurred when declared app dependencies are not installed.
    #[error("missing dependencies: {}", .0.join(", "))]
    MissingDependencies(Vec<String>),

    /// An error that occurred when no compose manifest could be resolved for an app.
    #[error("no compose manifest found for app: {0}")]
    ComposeNotFound(String),

    /// An error that occurred when no installed app record matched a name.
    #[error("installed app not found: {0}")]
    InstalledAppNotFound(String),

    /// An error that occurred when a container engine invocation failed.
    #[error("engine {stage} failed: {diagnostic}")]
    Engine {
        /// The pipeline stage the invocation belonged to, e.g. `compose:pull`.
        stage: &'static str,

        /// Structured detail about the failed command.
        diagnostic: CommandDiagnostic,
    },

    /// An error that occurred when post-start health verification failed.
    #[error("health check failed: {0}")]
    HealthCheck(String),
}

/// An error that can represent any error.
#[derive(Debug)]
pub struct AnyError {
    error: anyhow::Error,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl BerthError {
    /// Creates a new `Err` result.
    pub fn custom(error: impl Into<anyhow::Error>) -> BerthError {
        BerthError::Custom(AnyError {
            error: error.into(),
        })
    }

    /// Returns the engine stage tag carried by this error, if any.
    pub fn stage(&self) -> Option<&'static str> {
        match self {
            BerthError::Engine { stage, .. } => Some(stage),
            _ => None,
        }
    }
}

impl AnyError {
    /// Downcasts the error to a `T`.
    pub fn downcast<T>(&self) -> Option<&T>
    where
        T: Display + fmt::Debug + Send + Sync + 'static,
    {
        self.error.downcast_ref::<T>()
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Creates an `Ok` `BerthResult`.
#[allow(non_snake_case)]
pub fn Ok<T>(value: T) -> BerthResult<T> {
    Result::Ok(value)
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl PartialEq for AnyError {
    fn eq(&self, other: &Self) -> bool {
        self.error.to_string() == other.error.to_string()
    }
}

impl Display for AnyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)
    }
}

impl Error for AnyError {}
