use super::compiled::{CompiledScript, PipelineContext};
use super::data_type::{DataType, DataTypeRegistry};
use super::errors::PipelineError;
use super::evaluator::{
    FilterTransformerProgram, MessageScope, ProgramKind, ScriptEvaluator, ScriptPhase,
};
use super::filter_transformer::FilterTransformerExecutor;
use crate::config::{ConnectorConfig, TransformerConfig};
use crate::error::Result;
use crate::message::{ConnectorMessage, MessageContent, Response};
use std::sync::Arc;

/// Transformer applied to a destination's transport response
#[derive(Debug)]
pub struct ResponseTransformerExecutor {
    connector_name: String,
    metadata_id: u32,
    inbound: DataType,
    outbound: DataType,
    template: Option<String>,
    script: Option<CompiledScript>,
    context: PipelineContext,
}

impl ResponseTransformerExecutor {
    /// Same skip rule as the filter/transformer, without filter rules
    pub fn requires_execution(
        transformer: &TransformerConfig,
        inbound: &DataType,
        outbound: &DataType,
    ) -> bool {
        !transformer.steps.is_empty()
            || !inbound.name().eq_ignore_ascii_case(outbound.name())
            || inbound.serializer().is_serialization_required(true)
            || outbound.serializer().is_serialization_required(false)
            || transformer.template().is_some()
    }

    pub fn build(
        metadata_id: u32,
        connector: &ConnectorConfig,
        data_types: &DataTypeRegistry,
        evaluator: Arc<dyn ScriptEvaluator>,
        context: PipelineContext,
    ) -> Result<Self> {
        let transformer = &connector.response_transformer;
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

        let template =
            FilterTransformerExecutor::render_template(transformer, &outbound, &connector.name)?;

        let script = if Self::requires_execution(transformer, &inbound, &outbound) {
            let program = FilterTransformerProgram {
                channel_id: context.channel_id.clone(),
                connector_name: connector.name.clone(),
                metadata_id,
                kind: ProgramKind::ResponseTransformer,
                rules: Vec::new(),
                steps: transformer.steps.clone(),
                template: template.clone(),
            };
            Some(CompiledScript::compile(evaluator, &program)?)
        } else {
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

    pub fn inbound(&self) -> &DataType {
        &self.inbound
    }

    pub fn outbound(&self) -> &DataType {
        &self.outbound
    }

    /// Transform a transport response, recording the stages on the message
    pub async fn execute(
        &self,
        message: &mut ConnectorMessage,
        response: Response,
    ) -> std::result::Result<Response, PipelineError> {
        let Some(script) = &self.script else {
            message.processed_response =
                Some(MessageContent::new(response.data.clone(), self.outbound.name()));
            return Ok(response);
        };

        let content = if self.inbound.serializer().is_serialization_required(true) {
            self.inbound.to_internal(&self.connector_name, &response.data)?
        } else {
            response.data.clone()
        };

        let scope = MessageScope {
            channel_id: message.channel_id.clone(),
            message_id: message.message_id,
            metadata_id: self.metadata_id,
            connector_name: self.connector_name.clone(),
            message: content,
            template: self.template.clone(),
            source_map: Arc::clone(&message.source_map),
            channel_map: message.channel_map.clone(),
            response_map: message.response_map.clone(),
            destination_name_map: Arc::clone(&self.context.destination_name_map),
            global_channel_map: Arc::clone(&self.context.global_channel_map),
            global_map: Arc::clone(&self.context.global_map),
            response: Some(response.clone()),
        };

        let outcome = script
            .evaluate(&self.connector_name, ScriptPhase::ResponseTransformer, scope)
            .await?;

        message.channel_map = outcome.channel_map;
        message.response_map = outcome.response_map;
        message.response_transformed = Some(MessageContent::new(
            outcome.transformed.clone(),
            self.outbound.name(),
        ));

        let data = if self.outbound.serializer().is_serialization_required(false) {
            self.outbound
                .from_internal(&self.connector_name, &outcome.transformed)?
        } else {
            outcome.transformed
        };
        message.processed_response = Some(MessageContent::new(data.clone(), self.outbound.name()));

        let mut transformed = outcome.response.unwrap_or(response);
        transformed.data = data;
        Ok(transformed)
    }
}
