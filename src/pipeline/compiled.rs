use super::errors::PipelineError;
use super::evaluator::{
    EvaluationOutcome, FilterTransformerProgram, MessageScope, ScriptError, ScriptEvaluator,
    ScriptHandle, ScriptPhase,
};
use crate::engine::GlobalMap;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Per-channel state shared by every pipeline of that channel
#[derive(Debug, Clone)]
pub struct PipelineContext {
    pub channel_id: String,
    /// Destination name to `d<metadata id>`
    pub destination_name_map: Arc<HashMap<String, String>>,
    pub global_channel_map: Arc<GlobalMap>,
    pub global_map: Arc<GlobalMap>,
}

/// A compiled program, disposed with the evaluator when dropped
pub(crate) struct CompiledScript {
    handle: ScriptHandle,
    evaluator: Arc<dyn ScriptEvaluator>,
}

impl fmt::Debug for CompiledScript {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledScript")
            .field("handle", &self.handle)
            .finish()
    }
}

impl CompiledScript {
    pub(crate) fn compile(
        evaluator: Arc<dyn ScriptEvaluator>,
        program: &FilterTransformerProgram,
    ) -> Result<Self, PipelineError> {
        let handle = evaluator.compile(program).map_err(|e| PipelineError::Compile {
            connector: program.connector_name.clone(),
            source: ScriptError {
                phase: ScriptPhase::Compile,
                ..e
            },
        })?;

        debug!(
            channel_id = %program.channel_id,
            connector = %program.connector_name,
            handle = %handle.0,
            "PIPELINE: Compiled connector scripts"
        );

        Ok(Self { handle, evaluator })
    }

    /// Run the program on a blocking thread with an owned scope.
    ///
    /// `phase` tags failures of the blocking task itself.
    pub(crate) async fn evaluate(
        &self,
        connector: &str,
        phase: ScriptPhase,
        scope: MessageScope,
    ) -> Result<EvaluationOutcome, PipelineError> {
        let evaluator = Arc::clone(&self.evaluator);
        let handle = self.handle.clone();

        tokio::task::spawn_blocking(move || evaluator.evaluate(&handle, scope))
            .await
            .map_err(|e| {
                PipelineError::from_script(
                    connector,
                    ScriptError::new(phase, format!("evaluation task failed: {e}")),
                )
            })?
            .map_err(|e| PipelineError::from_script(connector, e))
    }
}

impl Drop for CompiledScript {
    fn drop(&mut self) {
        self.evaluator.dispose(&self.handle);
    }
}
