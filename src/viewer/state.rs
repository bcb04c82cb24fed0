use std::fmt;

use crate::{error::ViewerError, scene::ModelSummary};

/// Lifecycle of a viewer session
#[derive(Debug, Clone, PartialEq, Default)]
pub enum SessionStatus {
    /// No load has been requested yet
    #[default]
    Idle,
    /// A load was accepted and its task is starting
    Initializing,
    /// Bytes are being fetched and parsed
    Loading { progress: u8 },
    /// Normalization and material enhancement are running
    Processing,
    /// A scene is attached and interactive
    Ready,
    /// The last load failed; interaction stays blocked until the next load
    Error(ViewerError),
}

impl SessionStatus {
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready)
    }

    /// Whether a load is in flight
    pub fn is_busy(&self) -> bool {
        matches!(
            self,
            Self::Initializing | Self::Loading { .. } | Self::Processing
        )
    }

    pub fn error(&self) -> Option<&ViewerError> {
        match self {
            Self::Error(err) => Some(err),
            _ => None,
        }
    }

    /// Human readable status line, using `summary` once ready
    pub fn text(&self, summary: Option<&ModelSummary>) -> String {
        match (self, summary) {
            (Self::Ready, Some(summary)) => format!("Model loaded! {}", summary),
            _ => self.to_string(),
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "No model loaded"),
            Self::Initializing => write!(f, "Initializing viewer…"),
            Self::Loading { progress } => write!(f, "Loading {}%", progress),
            Self::Processing => write!(f, "Processing model…"),
            Self::Ready => write!(f, "Model loaded!"),
            Self::Error(err) => write!(f, "{}", err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::ModelFormat;

    #[test]
    fn status_lines() {
        assert_eq!(SessionStatus::Initializing.to_string(), "Initializing viewer…");
        assert_eq!(SessionStatus::Loading { progress: 42 }.to_string(), "Loading 42%");
        assert_eq!(SessionStatus::Processing.to_string(), "Processing model…");
        let err = SessionStatus::Error(ViewerError::EmptyGeometry);
        assert_eq!(err.to_string(), "Model contains no measurable geometry");
        assert!(!err.is_busy());
    }

    #[test]
    fn ready_line_carries_counts() {
        let summary = ModelSummary {
            format: ModelFormat::Stl,
            mesh_count: 1,
            vertex_count: 36,
            face_count: 12,
            material_count: 1,
            texture_count: 0,
            dimensions: [2.0; 3],
            normalized_dimensions: [5.0; 3],
            scale: 2.5,
        };
        assert_eq!(
            SessionStatus::Ready.text(Some(&summary)),
            "Model loaded! 1 meshes, 36 vertices, 12 faces"
        );
    }
}
