//! Error types for the tool registry.

use thiserror::Error;

/// Result type alias for registry operations.
pub type Result<T> = std::result::Result<T, RegistryError>;

/// Errors that can occur while building snapshots or invoking tools.
#[derive(Error, Debug)]
pub enum RegistryError {
    /// A name was registered twice within the same pending snapshot.
    #[error("name collision: `{name}` is already registered in {directory}")]
    NameCollision { name: String, directory: String },

    /// Tool name does not match `^[a-z][a-z0-9_]{0,29}$`.
    #[error("invalid tool name: `{0}`")]
    InvalidName(String),

    /// Tool not found.
    #[error("tool not found: {0}")]
    NotFound(String),

    /// The tool ran but reported a failure.
    #[error("invocation of `{name}` failed: {message}")]
    Invocation { name: String, message: String },
}

/// Failure to load one source unit.
///
/// Load errors are absorbed by the directory loader and reported per unit;
/// they never abort the load of sibling units.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LoadError {
    /// The unit could not be read from disk.
    #[error("failed to read {unit}: {message}")]
    Read { unit: String, message: String },

    /// The unit is not valid script source.
    #[error("failed to compile {unit}: {message}")]
    Compile { unit: String, message: String },

    /// Executing the unit's top-level statements raised an error.
    #[error("failed to execute {unit}: {message}")]
    Execute { unit: String, message: String },

    /// The unit tried to claim a name already taken in the same load pass.
    #[error("{unit} tried to register `{name}`, which is already registered in {directory}")]
    NameCollision {
        unit: String,
        name: String,
        directory: String,
    },

    /// The unit made a registration call that cannot be honored.
    #[error("invalid registration in {unit}: {message}")]
    Registration { unit: String, message: String },
}

impl LoadError {
    /// The unit label this error refers to.
    pub fn unit(&self) -> &str {
        match self {
            Self::Read { unit, .. }
            | Self::Compile { unit, .. }
            | Self::Execute { unit, .. }
            | Self::NameCollision { unit, .. }
            | Self::Registration { unit, .. } => unit,
        }
    }
}
