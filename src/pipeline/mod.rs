//! # Dispatch Pipeline
//!
//! Filter, transformer and response transformer execution for a single
//! connector, plus the data types and evaluator seam they are built on.

mod compiled;
pub mod data_type;
pub mod errors;
pub mod evaluator;
pub mod filter_transformer;
pub mod response_transformer;

pub use compiled::PipelineContext;
pub use data_type::{
    DataType, DataTypePlugin, DataTypeRegistry, MessageSerializer, PassthroughSerializer,
    SerializationType,
};
pub use errors::PipelineError;
pub use evaluator::{
    EvaluationOutcome, FilterTransformerProgram, MessageScope, PassthroughEvaluator, ProgramKind,
    ScriptError, ScriptEvaluator, ScriptHandle, ScriptPhase,
};
pub use filter_transformer::{FilterTransformerExecutor, FilterTransformerResult};
pub use response_transformer::ResponseTransformerExecutor;
