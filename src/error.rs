//! Error types for journey migration

use std::fmt;

use thiserror::Error;

/// Result type for migration operations
pub type Result<T> = std::result::Result<T, MigrateError>;

/// Kind of remote object an error refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArtifactKind {
    Journey,
    Node,
    InnerNode,
    Script,
    EmailTemplate,
    Saml2Entity,
    CircleOfTrust,
    SocialIdentityProvider,
    Theme,
    Bundle,
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ArtifactKind::Journey => "journey",
            ArtifactKind::Node => "node",
            ArtifactKind::InnerNode => "inner node",
            ArtifactKind::Script => "script",
            ArtifactKind::EmailTemplate => "email template",
            ArtifactKind::Saml2Entity => "SAML2 entity",
            ArtifactKind::CircleOfTrust => "circle of trust",
            ArtifactKind::SocialIdentityProvider => "social identity provider",
            ArtifactKind::Theme => "theme",
            ArtifactKind::Bundle => "bundle",
        };
        f.write_str(name)
    }
}

/// Journey migration errors
#[derive(Error, Debug)]
pub enum MigrateError {
    #[error("{kind} not found: {id}")]
    NotFound { kind: ArtifactKind, id: String },

    #[error("{kind} is not supported by this deployment: {detail}")]
    Unsupported { kind: ArtifactKind, detail: String },

    #[error("{kind} {id} conflicts with an existing {kind} named '{name}'")]
    Conflict {
        kind: ArtifactKind,
        id: String,
        name: String,
    },

    #[error("Bundle validation failed: {0}")]
    Validation(String),

    #[error("Transport error{}: {message}", .status.map(|s| format!(" (HTTP {s})")).unwrap_or_default())]
    Transport { status: Option<u16>, message: String },

    #[error("Error collecting journey {journey}: {source}")]
    Collect {
        journey: String,
        #[source]
        source: Box<MigrateError>,
    },

    #[error("Error importing {kind} {id} in journey {journey}: {source}")]
    Import {
        journey: String,
        kind: ArtifactKind,
        id: String,
        #[source]
        source: Box<MigrateError>,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] config_crate::ConfigError),
}

impl MigrateError {
    pub fn not_found(kind: ArtifactKind, id: impl Into<String>) -> Self {
        MigrateError::NotFound {
            kind,
            id: id.into(),
        }
    }

    pub fn unsupported(kind: ArtifactKind, detail: impl Into<String>) -> Self {
        MigrateError::Unsupported {
            kind,
            detail: detail.into(),
        }
    }

    pub fn transport(status: Option<u16>, message: impl Into<String>) -> Self {
        MigrateError::Transport {
            status,
            message: message.into(),
        }
    }

    /// Wrap an error raised while collecting `journey`
    pub fn in_collection(self, journey: impl Into<String>) -> Self {
        MigrateError::Collect {
            journey: journey.into(),
            source: Box::new(self),
        }
    }

    /// Wrap an error raised while writing one artifact of `journey`
    pub fn in_import(self, journey: &str, kind: ArtifactKind, id: &str) -> Self {
        MigrateError::Import {
            journey: journey.to_string(),
            kind,
            id: id.to_string(),
            source: Box::new(self),
        }
    }

    /// Innermost error, skipping context wrappers
    pub fn root(&self) -> &MigrateError {
        match self {
            MigrateError::Collect { source, .. } | MigrateError::Import { source, .. } => {
                source.root()
            }
            other => other,
        }
    }

    pub fn is_unsupported(&self) -> bool {
        matches!(self.root(), MigrateError::Unsupported { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self.root(), MigrateError::NotFound { .. })
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self.root(), MigrateError::Conflict { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_unwraps_context() {
        let err = MigrateError::not_found(ArtifactKind::Script, "abc")
            .in_import("Login", ArtifactKind::Script, "abc")
            .in_collection("Outer");
        assert!(err.is_not_found());
        assert!(!err.is_unsupported());
    }

    #[test]
    fn test_messages_carry_context() {
        let err = MigrateError::transport(Some(502), "bad gateway").in_import(
            "Login",
            ArtifactKind::Node,
            "n1",
        );
        let message = err.to_string();
        assert!(message.contains("node n1"));
        assert!(message.contains("journey Login"));
        assert!(message.contains("HTTP 502"));
    }
}
