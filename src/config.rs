//! Configuration types.

use std::path::PathBuf;

use uuid::Uuid;

use crate::error::ConfigError;

/// Runtime configuration for the intake binary.
#[derive(Debug, Clone)]
pub struct IntakeConfig {
    /// Path of the libSQL database holding sessions, drafts and snapshots.
    pub db_path: PathBuf,
    /// Path of the question catalog JSON file.
    pub catalog_path: Option<PathBuf>,
    /// Workspace the drafts and snapshots are scoped to.
    pub workspace_id: String,
    /// Existing session to resume. A new session is created when absent.
    pub session_id: Option<Uuid>,
    /// Port for the REST surface. Disabled when absent.
    pub http_port: Option<u16>,
}

impl Default for IntakeConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("./data/intake.db"),
            catalog_path: None,
            workspace_id: "default".to_string(),
            session_id: None,
            http_port: None,
        }
    }
}

impl IntakeConfig {
    /// Build the configuration from `INTAKE_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let db_path = std::env::var("INTAKE_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or(defaults.db_path);

        let catalog_path = std::env::var("INTAKE_CATALOG").ok().map(PathBuf::from);

        let workspace_id = std::env::var("INTAKE_WORKSPACE")
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or(defaults.workspace_id);

        let session_id = match std::env::var("INTAKE_SESSION_ID") {
            Ok(raw) if !raw.trim().is_empty() => {
                Some(Uuid::parse_str(raw.trim()).map_err(|e| ConfigError::InvalidValue {
                    key: "INTAKE_SESSION_ID".to_string(),
                    message: e.to_string(),
                })?)
            }
            _ => None,
        };

        let http_port: Option<u16> = std::env::var("INTAKE_HTTP_PORT")
            .ok()
            .and_then(|s| s.parse().ok());

        Ok(Self {
            db_path,
            catalog_path,
            workspace_id,
            session_id,
            http_port,
        })
    }

    /// The catalog path, or an error naming the variable to set.
    pub fn require_catalog(&self) -> Result<&PathBuf, ConfigError> {
        self.catalog_path
            .as_ref()
            .ok_or_else(|| ConfigError::MissingEnvVar("INTAKE_CATALOG".to_string()))
    }
}
