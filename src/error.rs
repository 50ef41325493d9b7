// Error taxonomy
// Precondition failures are raised before any row is processed; per-row data
// defects are never errors (they fall back to null/zero defaults).

use thiserror::Error;

// ============================================================================
// ERROR KIND
// ============================================================================

/// Coarse classification used by callers to decide how to surface an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Input/configuration problem detected before bulk work starts
    Validation,

    /// A named thing (rule, company) does not exist
    NotFound,

    /// Persistence collaborator failure
    Storage,

    /// Reading or writing files
    Io,

    /// Bad or unreadable configuration
    Configuration,
}

impl ErrorKind {
    /// Fixed display title for each kind
    pub fn title(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "Validation Failed",
            ErrorKind::NotFound => "Not Found",
            ErrorKind::Storage => "Storage Failure",
            ErrorKind::Io => "File Error",
            ErrorKind::Configuration => "Configuration Error",
        }
    }
}

// ============================================================================
// UNIFICATION ERROR
// ============================================================================

#[derive(Debug, Error)]
pub enum UnificationError {
    /// The source file lacks columns a parser needs
    #[error("{parser} is missing required headers: {}", missing.join(", "))]
    MissingHeaders { parser: String, missing: Vec<String> },

    /// Filter rule name is not in the registry
    #[error("filter rule '{0}' not found")]
    RuleNotFound(String),

    /// Company identifier could not be resolved
    #[error("company '{0}' not found")]
    CompanyNotFound(String),

    /// A source format was asked for an entity it does not carry
    #[error("{format} does not produce {target} records")]
    UnsupportedTarget { format: String, target: String },

    /// Source format name could not be resolved or detected
    #[error("unknown source format '{0}'")]
    UnknownFormat(String),

    /// Entity target name could not be resolved
    #[error("unknown entity target '{0}'")]
    UnknownTarget(String),

    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("configuration error: {0}")]
    Configuration(String),
}

impl UnificationError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            UnificationError::MissingHeaders { .. }
            | UnificationError::UnsupportedTarget { .. }
            | UnificationError::UnknownFormat(_)
            | UnificationError::UnknownTarget(_) => ErrorKind::Validation,
            UnificationError::RuleNotFound(_) | UnificationError::CompanyNotFound(_) => {
                ErrorKind::NotFound
            }
            UnificationError::Storage(_) | UnificationError::Serialization(_) => {
                ErrorKind::Storage
            }
            UnificationError::Csv(_) | UnificationError::Io(_) => ErrorKind::Io,
            UnificationError::Configuration(_) => ErrorKind::Configuration,
        }
    }

    /// Display title of this error's kind
    pub fn title(&self) -> &'static str {
        self.kind().title()
    }

    /// True for the small set of precondition failures raised before bulk work
    pub fn is_precondition(&self) -> bool {
        matches!(self.kind(), ErrorKind::Validation | ErrorKind::NotFound)
    }
}

impl From<toml::de::Error> for UnificationError {
    fn from(err: toml::de::Error) -> Self {
        UnificationError::Configuration(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, UnificationError>;
