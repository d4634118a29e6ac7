use mongodb::error::{Error as MongoError, ErrorKind};
use std::path::PathBuf;
use thiserror::Error;

/// Server code returned when an index with the same name exists with different options.
pub const INDEX_OPTIONS_CONFLICT: i32 = 85;
/// Server code returned when an index with the same name exists with a different key.
pub const INDEX_KEY_SPECS_CONFLICT: i32 = 86;

pub type ProvisionResult<T> = Result<T, ProvisionError>;

#[derive(Error, Debug)]
pub enum ProvisionError {
    #[error("Failed to reach MongoDB: {0}")]
    Connection(#[source] MongoError),

    #[error("Index {index} conflicts with an existing index: {source}")]
    SchemaConflict {
        index: String,
        #[source]
        source: MongoError,
    },

    #[error("Failed to create index {index}: {source}")]
    IndexCreation {
        index: String,
        #[source]
        source: MongoError,
    },

    #[error("Failed to list indexes: {0}")]
    IndexListing(#[source] MongoError),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Failed to load config file {}: {reason}", path.display())]
    ConfigFile { path: PathBuf, reason: String },
}

impl ProvisionError {
    /// Classifies a driver error raised while declaring `index`.
    pub fn from_index_error(index: impl Into<String>, err: MongoError) -> Self {
        if is_connection_error(&err) {
            return Self::Connection(err);
        }
        match command_error_code(&err) {
            Some(INDEX_OPTIONS_CONFLICT | INDEX_KEY_SPECS_CONFLICT) => {
                Self::SchemaConflict { index: index.into(), source: err }
            }
            _ => Self::IndexCreation { index: index.into(), source: err },
        }
    }

    /// Classifies a driver error raised while listing the collection's indexes.
    pub fn from_listing_error(err: MongoError) -> Self {
        if is_connection_error(&err) {
            Self::Connection(err)
        } else {
            Self::IndexListing(err)
        }
    }

    /// Short label used as a metric attribute.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Connection(_) => "connection",
            Self::SchemaConflict { .. } => "schema_conflict",
            Self::IndexCreation { .. } => "index_creation",
            Self::IndexListing(_) => "index_listing",
            Self::InvalidConfig(_) => "invalid_config",
            Self::ConfigFile { .. } => "config_file",
        }
    }
}

/// True for failures that mean the server could not be selected, reached or authenticated against.
/// URI and option parsing errors are mapped to `Connection` by `MongoClient::connect` itself.
pub fn is_connection_error(err: &MongoError) -> bool {
    matches!(
        &*err.kind,
        ErrorKind::Authentication { .. }
            | ErrorKind::DnsResolve { .. }
            | ErrorKind::Io(..)
            | ErrorKind::ConnectionPoolCleared { .. }
            | ErrorKind::ServerSelection { .. }
    )
}

/// Server error code of a failed command, if the failure came from the server.
pub fn command_error_code(err: &MongoError) -> Option<i32> {
    let ErrorKind::Command(command_error) = &*err.kind else { return None };
    Some(command_error.code)
}
