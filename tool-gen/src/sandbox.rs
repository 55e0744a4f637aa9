//! Trial loads of candidate source in a throwaway namespace.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use toolsmith_registry::{
    DEFAULT_UNIT_EXTENSION, Member, SandboxUnitLoader, SourceUnit, UnitLoader,
};
use tracing::debug;

/// Outcome of validating a candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "reason", rename_all = "snake_case")]
pub enum Validation {
    /// The candidate loads and exposes a callable under the expected name.
    Valid,

    /// The candidate is unusable, and why.
    Invalid(String),
}

impl Validation {
    /// Whether the candidate passed.
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid)
    }

    /// The failure reason, if any.
    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::Valid => None,
            Self::Invalid(reason) => Some(reason),
        }
    }
}

/// What a trial load found out about a candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Trial {
    /// The shape check.
    pub validation: Validation,

    /// Whether the candidate called `register_tool` for the expected name.
    /// A valid candidate that does not is published but never becomes a
    /// tool.
    pub registered: bool,
}

/// Loads candidates in isolation and checks their shape.
///
/// Validation only checks that the candidate loads and defines a callable
/// with the expected name. It never registers anything into a live registry.
#[derive(Debug, Clone)]
pub struct SandboxRunner {
    /// Directory for candidate files.
    dir: PathBuf,

    /// Extension of candidate files.
    extension: String,
}

impl SandboxRunner {
    /// Create a runner that writes candidates under `dir`.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            extension: DEFAULT_UNIT_EXTENSION.to_string(),
        }
    }

    /// Set the candidate file extension.
    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = extension.into();
        self
    }

    /// Directory candidates are written to.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Validate `source` as a unit defining `expected_name`.
    ///
    /// The candidate is written to a uniquely named file that is removed
    /// before this returns, whatever the outcome.
    pub fn validate(&self, source: &str, expected_name: &str) -> Validation {
        self.trial(source, expected_name).validation
    }

    /// Validate `source` and also report whether it registers
    /// `expected_name`.
    pub fn trial(&self, source: &str, expected_name: &str) -> Trial {
        match self.try_trial(source, expected_name) {
            Ok(trial) => trial,
            Err(reason) => Trial {
                validation: Validation::Invalid(reason),
                registered: false,
            },
        }
    }

    fn try_trial(&self, source: &str, expected_name: &str) -> Result<Trial, String> {
        std::fs::create_dir_all(&self.dir)
            .map_err(|e| format!("cannot create sandbox directory {}: {e}", self.dir.display()))?;

        let candidate = tempfile::Builder::new()
            .prefix(&format!("candidate_{expected_name}_"))
            .suffix(&format!(".{}", self.extension))
            .tempfile_in(&self.dir)
            .map_err(|e| format!("cannot create candidate file: {e}"))?;
        std::fs::write(candidate.path(), source)
            .map_err(|e| format!("cannot write candidate file: {e}"))?;
        debug!("Validating candidate `{expected_name}` at {}", candidate.path().display());

        let unit = SourceUnit::read(candidate.path(), "sandbox").map_err(|e| e.to_string())?;
        let namespace = match SandboxUnitLoader.load_unit(&unit) {
            Ok(namespace) => namespace,
            Err(e) => {
                return Ok(Trial {
                    validation: Validation::Invalid(format!("Candidate failed to load: {e}")),
                    registered: false,
                });
            }
        };

        let validation = match namespace.member(expected_name) {
            None => {
                let defined: Vec<&str> = namespace
                    .members()
                    .filter(|(_, member)| member.is_callable())
                    .map(|(name, _)| name)
                    .collect();
                Validation::Invalid(format!(
                    "Candidate does not define `{expected_name}`; callables found: [{}]",
                    defined.join(", ")
                ))
            }
            Some(member) if !member.is_callable() => {
                let type_name = match member {
                    Member::Value { type_name, .. } => type_name.as_str(),
                    Member::Function { .. } => "function",
                };
                Validation::Invalid(format!(
                    "`{expected_name}` is a {type_name}, not a callable"
                ))
            }
            Some(_) => Validation::Valid,
        };

        let registered = namespace
            .registrations()
            .iter()
            .any(|registration| registration.name == expected_name);

        // `candidate` is dropped here, deleting the file.
        Ok(Trial {
            validation,
            registered,
        })
    }
}
