use super::compiled::{CompiledScript, PipelineContext};
use super::data_type::{DataType, DataTypeRegistry};
use super::errors::PipelineError;
use super::evaluator::{
    FilterTransformerProgram, MessageScope, ProgramKind, ScriptEvaluator, ScriptPhase,
};
use crate::config::{ConnectorConfig, FilterConfig, TransformerConfig};
use crate::error::Result;
use crate::message::{ConnectorMessage, MessageContent};
use std::sync::Arc;
use tracing::debug;

/// Routing decision and payload produced by a connector's pipeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterTransformerResult {
    pub accepted: bool,
    /// Encoded payload when accepted, the unmodified input when filtered
    pub payload: String,
}

/// Filter and transformer for one connector
#[derive(Debug)]
pub struct FilterTransformerExecutor {
    connector_name: String,
    metadata_id: u32,
    inbound: DataType,
    outbound: DataType,
    template: Option<String>,
    script: Option<CompiledScript>,
    context: PipelineContext,
}

impl FilterTransformerExecutor {
    /// Whether the pipeline has anything to do at all.
    ///
    /// Execution is skipped only when there are no rules and no steps, the
    /// data types match, neither serializer needs a pass and there is no
    /// outbound template.
    pub fn requires_execution(
        filter: &FilterConfig,
        transformer: &TransformerConfig,
        inbound: &DataType,
        outbound: &DataType,
    ) -> bool {
        !filter.rules.is_empty()
            || !transformer.steps.is_empty()
            || !inbound.name().eq_ignore_ascii_case(outbound.name())
            || inbound.serializer().is_serialization_required(true)
            || outbound.serializer().is_serialization_required(false)
            || transformer.template().is_some()
    }

    /// Render the outbound template once, at construction.
    ///
    /// Raw and binary types keep the template verbatim; others convert it to
    /// the internal format.
    pub fn render_template(
        transformer: &TransformerConfig,
        outbound: &DataType,
        connector: &str,
    ) -> std::result::Result<Option<String>, PipelineError> {
        let Some(template) = transformer.template() else {
            return Ok(None);
        };

        if outbound.keeps_template_verbatim() {
            return Ok(Some(template.to_string()));
        }

        outbound
            .to_internal(connector, template)
            .map(Some)
            .map_err(|e| match e {
                PipelineError::Serialization {
                    connector,
                    data_type,
                    reason,
                } => PipelineError::Serialization {
                    reason: format!("outbound template: {reason}"),
                    connector,
                    data_type,
                },
                other => other,
            })
    }

    pub fn build(
        metadata_id: u32,
        connector: &ConnectorConfig,
        data_types: &DataTypeRegistry,
        evaluator: Arc<dyn ScriptEvaluator>,
        context: PipelineContext,
    ) -> Result<Self> {
        let transformer = &connector.transformer;
        let inbound = data_types.resolve(
            &transformer.inbound_data_type,
            &transformer.inbound_properties,
            &connector.name,
        )?;
        let outbound = data_types.resolve(
            &transformer.outbound_data_type,
            &transformer.outbound_properties,
            &connector.name,
        )?;

        let template = Self::render_template(transformer, &outbound, &connector.name)?;

        let script = if Self::requires_execution(&connector.filter, transformer, &inbound, &outbound)
        {
            let program = FilterTransformerProgram {
                channel_id: context.channel_id.clone(),
                connector_name: connector.name.clone(),
                metadata_id,
                kind: ProgramKind::FilterTransformer,
                rules: connector.filter.rules.clone(),
                steps: transformer.steps.clone(),
                template: template.clone(),
            };
            Some(CompiledScript::compile(evaluator, &program)?)
        } else {
            debug!(
                channel_id = %context.channel_id,
                connector = %connector.name,
                "PIPELINE: Filter/transformer skipped, nothing to execute"
            );
            None
        };

        Ok(Self {
            connector_name: connector.name.clone(),
            metadata_id,
            inbound,
            outbound,
            template,
            script,
            context,
        })
    }

    pub fn is_skipped(&self) -> bool {
        self.script.is_none()
    }

    pub fn template(&self) -> Option<&str> {
        self.template.as_deref()
    }

    pub fn inbound(&self) -> &DataType {
        &self.inbound
    }

    pub fn outbound(&self) -> &DataType {
        &self.outbound
    }

    /// Run the filter and transformer against a message.
    ///
    /// On success the message carries its transformed and encoded content and
    /// updated maps. Status changes are left to the caller.
    pub async fn execute(
        &self,
        message: &mut ConnectorMessage,
    ) -> std::result::Result<FilterTransformerResult, PipelineError> {
        let Some(script) = &self.script else {
            let payload = message.raw_content().to_string();
            message.encoded = Some(MessageContent::new(payload.clone(), self.outbound.name()));
            return Ok(FilterTransformerResult {
                accepted: true,
                payload,
            });
        };

        let raw = message.raw_content();
        let content = if self.inbound.serializer().is_serialization_required(true) {
            self.inbound.to_internal(&self.connector_name, raw)?
        } else {
            raw.to_string()
        };

        let scope = MessageScope {
            channel_id: message.channel_id.clone(),
            message_id: message.message_id,
            metadata_id: self.metadata_id,
            connector_name: self.connector_name.clone(),
            message: content.clone(),
            template: self.template.clone(),
            source_map: Arc::clone(&message.source_map),
            channel_map: message.channel_map.clone(),
            response_map: message.response_map.clone(),
            destination_name_map: Arc::clone(&self.context.destination_name_map),
            global_channel_map: Arc::clone(&self.context.global_channel_map),
            global_map: Arc::clone(&self.context.global_map),
            response: None,
        };

        let outcome = script
            .evaluate(&self.connector_name, ScriptPhase::Transformer, scope)
            .await?;

        message.channel_map = outcome.channel_map;
        message.response_map = outcome.response_map;

        if !outcome.accepted {
            return Ok(FilterTransformerResult {
                accepted: false,
                payload: content,
            });
        }

        message.transformed = Some(MessageContent::new(
            outcome.transformed.clone(),
            self.outbound.name(),
        ));

        let encoded = if self.outbound.serializer().is_serialization_required(false) {
            self.outbound
                .from_internal(&self.connector_name, &outcome.transformed)?
        } else {
            outcome.transformed
        };
        message.encoded = Some(MessageContent::new(encoded.clone(), self.outbound.name()));

        Ok(FilterTransformerResult {
            accepted: true,
            payload: encoded,
        })
    }
}
