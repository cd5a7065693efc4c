use thiserror::Error;

/// Errors surfaced by the permission core.
///
/// Expected failures (bad input, missing entries, integrity guards) are always
/// returned as values; command handlers translate the message straight into a
/// reply. Nothing in this crate panics on user input.
#[derive(Error, Debug)]
pub enum PermissionError {
    // Validation errors
    #[error("Invalid duration '{input}': {message}")]
    InvalidDuration { input: String, message: String },

    #[error("Unknown permission: '{name}'")]
    UnknownPermission { name: String },

    #[error("Permission '{name}' cannot be granted temporarily")]
    NotGrantable { name: String },

    #[error("Unknown permission group: '{name}'")]
    UnknownGroup { name: String },

    #[error("Permission group already exists: '{name}'")]
    DuplicateGroup { name: String },

    // Referential-integrity errors
    #[error("Cannot delete builtin group '{name}'")]
    BuiltinGroup { name: String },

    #[error("Group '{name}' is still in use: {usage}")]
    GroupInUse { name: String, usage: String },

    // Not-found errors
    #[error("No temporary grant found for user {user_id}")]
    GrantNotFound { user_id: String },

    #[error("No context configuration for {context_id}")]
    ContextNotFound { context_id: String },

    #[error("{what} not found")]
    NotFound { what: String },

    // Assignment errors
    #[error("Group '{group}' is already assigned to {target}")]
    AlreadyAssigned { group: String, target: String },

    #[error("Group '{group}' is not assigned to {target}")]
    NotAssigned { group: String, target: String },

    // Configuration errors
    #[error("Failed to load config file '{path}': {source}")]
    ConfigLoad {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file '{path}': {source}")]
    ConfigParse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    // Generic errors
    #[error("Internal error: {message}")]
    Internal { message: String },
}

pub type Result<T> = std::result::Result<T, PermissionError>;
