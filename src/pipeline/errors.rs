use super::evaluator::{ScriptError, ScriptPhase};
use crate::events::ErrorEventType;
use thiserror::Error;

/// Failure while running a connector's pipeline for one message.
///
/// Aborts only the current connector's processing of that message.
#[derive(Debug, Clone, Error)]
pub enum PipelineError {
    #[error("Error evaluating filter for '{connector}': {source}")]
    Filter {
        connector: String,
        #[source]
        source: ScriptError,
    },

    #[error("Error evaluating transformer for '{connector}': {source}")]
    Transform {
        connector: String,
        #[source]
        source: ScriptError,
    },

    #[error("Error evaluating response transformer for '{connector}': {source}")]
    ResponseTransform {
        connector: String,
        #[source]
        source: ScriptError,
    },

    #[error("Error compiling scripts for '{connector}': {source}")]
    Compile {
        connector: String,
        #[source]
        source: ScriptError,
    },

    #[error("Error serializing {data_type} content for '{connector}': {reason}")]
    Serialization {
        connector: String,
        data_type: String,
        reason: String,
    },
}

impl PipelineError {
    /// Classify an evaluator failure by the phase it reports
    pub fn from_script(connector: impl Into<String>, source: ScriptError) -> Self {
        let connector = connector.into();
        match source.phase {
            ScriptPhase::Filter => Self::Filter { connector, source },
            ScriptPhase::Transformer => Self::Transform { connector, source },
            ScriptPhase::ResponseTransformer => Self::ResponseTransform { connector, source },
            ScriptPhase::Compile => Self::Compile { connector, source },
        }
    }

    pub fn serialization(
        connector: impl Into<String>,
        data_type: impl Into<String>,
        reason: impl std::fmt::Display,
    ) -> Self {
        Self::Serialization {
            connector: connector.into(),
            data_type: data_type.into(),
            reason: reason.to_string(),
        }
    }

    pub fn error_event_type(&self) -> ErrorEventType {
        match self {
            Self::Filter { .. } => ErrorEventType::Filter,
            Self::Transform { .. } => ErrorEventType::Transformer,
            Self::ResponseTransform { .. } => ErrorEventType::ResponseTransformer,
            Self::Compile { .. } => ErrorEventType::Deploy,
            Self::Serialization { .. } => ErrorEventType::Serializer,
        }
    }

    /// Short description used as the error event message
    pub fn summary(&self) -> &'static str {
        match self {
            Self::Filter { .. } => "Error evaluating filter",
            Self::Transform { .. } => "Error evaluating transformer",
            Self::ResponseTransform { .. } => "Error evaluating response transformer",
            Self::Compile { .. } => "Error compiling filter/transformer",
            Self::Serialization { .. } => "Error serializing message",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_selects_variant() {
        let err = PipelineError::from_script(
            "Lab",
            ScriptError::new(ScriptPhase::Filter, "msg is undefined").at_line(4),
        );
        assert!(matches!(err, PipelineError::Filter { .. }));
        assert_eq!(err.error_event_type(), ErrorEventType::Filter);
        assert!(err.to_string().contains("line 4"));

        let err = PipelineError::from_script("Lab", ScriptError::new(ScriptPhase::Transformer, "x"));
        assert_eq!(err.error_event_type(), ErrorEventType::Transformer);
    }
}
