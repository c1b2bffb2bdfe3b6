//! Script evaluator seam.
//!
//! The engine never interprets filter or transformer scripts itself. It hands
//! a compiled handle and an owned [`MessageScope`] to a [`ScriptEvaluator`] and
//! receives an owned [`EvaluationOutcome`] or a phase-tagged [`ScriptError`].

use crate::config::{FilterRule, TransformerStep};
use crate::engine::GlobalMap;
use crate::message::{MessageMap, Response};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScriptPhase {
    Filter,
    Transformer,
    ResponseTransformer,
    Compile,
}

impl fmt::Display for ScriptPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Filter => "filter",
            Self::Transformer => "transformer",
            Self::ResponseTransformer => "response transformer",
            Self::Compile => "compile",
        };
        f.write_str(name)
    }
}

/// Evaluation failure carrying the phase it happened in
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub struct ScriptError {
    pub phase: ScriptPhase,
    pub message: String,
    pub line: Option<u32>,
    pub context: Option<String>,
}

impl fmt::Display for ScriptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} error: {}", self.phase, self.message)?;
        if let Some(line) = self.line {
            write!(f, " (line {line})")?;
        }
        if let Some(context) = &self.context {
            write!(f, " near '{context}'")?;
        }
        Ok(())
    }
}

impl ScriptError {
    pub fn new(phase: ScriptPhase, message: impl Into<String>) -> Self {
        Self {
            phase,
            message: message.into(),
            line: None,
            context: None,
        }
    }

    pub fn at_line(mut self, line: u32) -> Self {
        self.line = Some(line);
        self
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }
}

/// Opaque reference to a compiled program, owned by the evaluator
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ScriptHandle(pub String);

impl ScriptHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

/// What a program computes: a response transformer has only steps
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgramKind {
    FilterTransformer,
    ResponseTransformer,
}

/// Everything the evaluator needs to compile one connector's scripts
#[derive(Debug, Clone)]
pub struct FilterTransformerProgram {
    pub channel_id: String,
    pub connector_name: String,
    pub metadata_id: u32,
    pub kind: ProgramKind,
    pub rules: Vec<FilterRule>,
    pub steps: Vec<TransformerStep>,
    /// Outbound template, already rendered into the internal format
    pub template: Option<String>,
}

/// Owned view of a message handed to the evaluator
#[derive(Debug, Clone)]
pub struct MessageScope {
    pub channel_id: String,
    pub message_id: u64,
    pub metadata_id: u32,
    pub connector_name: String,
    /// Inbound content after inbound serialization
    pub message: String,
    pub template: Option<String>,
    pub source_map: Arc<MessageMap>,
    pub channel_map: MessageMap,
    pub response_map: MessageMap,
    pub destination_name_map: Arc<HashMap<String, String>>,
    pub global_channel_map: Arc<GlobalMap>,
    pub global_map: Arc<GlobalMap>,
    /// Present only for response transformers
    pub response: Option<Response>,
}

/// Result of running a program against one message
#[derive(Debug, Clone)]
pub struct EvaluationOutcome {
    pub accepted: bool,
    /// Transformed content in the internal format
    pub transformed: String,
    pub channel_map: MessageMap,
    pub response_map: MessageMap,
    /// Response as modified by a response transformer
    pub response: Option<Response>,
}

impl EvaluationOutcome {
    /// Accept with the given content and the scope's maps unchanged
    pub fn accept(scope: MessageScope, transformed: impl Into<String>) -> Self {
        Self {
            accepted: true,
            transformed: transformed.into(),
            channel_map: scope.channel_map,
            response_map: scope.response_map,
            response: scope.response,
        }
    }

    pub fn reject(scope: MessageScope) -> Self {
        Self {
            accepted: false,
            transformed: scope.message,
            channel_map: scope.channel_map,
            response_map: scope.response_map,
            response: scope.response,
        }
    }
}

/// Externally supplied script engine.
///
/// `evaluate` may block; the engine always calls it from a blocking thread.
pub trait ScriptEvaluator: Send + Sync + fmt::Debug {
    fn compile(&self, program: &FilterTransformerProgram) -> Result<ScriptHandle, ScriptError>;

    fn evaluate(
        &self,
        handle: &ScriptHandle,
        scope: MessageScope,
    ) -> Result<EvaluationOutcome, ScriptError>;

    fn dispose(&self, _handle: &ScriptHandle) {}
}

/// Evaluator for deployments without a script engine.
///
/// Serialization-only programs pass through (emitting the template when one
/// is set); programs with rules or steps are rejected at compile time.
#[derive(Debug, Default, Clone, Copy)]
pub struct PassthroughEvaluator;

impl ScriptEvaluator for PassthroughEvaluator {
    fn compile(&self, program: &FilterTransformerProgram) -> Result<ScriptHandle, ScriptError> {
        if !program.rules.is_empty() || !program.steps.is_empty() {
            return Err(ScriptError::new(
                ScriptPhase::Compile,
                "no script evaluator configured for filter rules or transformer steps",
            )
            .with_context(program.connector_name.clone()));
        }
        Ok(ScriptHandle::new(format!(
            "{}:{}:passthrough",
            program.channel_id, program.metadata_id
        )))
    }

    fn evaluate(
        &self,
        _handle: &ScriptHandle,
        scope: MessageScope,
    ) -> Result<EvaluationOutcome, ScriptError> {
        let transformed = scope.template.clone().unwrap_or_else(|| scope.message.clone());
        Ok(EvaluationOutcome::accept(scope, transformed))
    }
}
