use crate::config::ResponseSelection;
use crate::message::{Message, Response, Status};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Picks the response handed back to the dispatching caller
#[derive(Debug, Clone)]
pub struct ResponseSelector {
    respond_from: ResponseSelection,
    destination_name_map: Arc<HashMap<String, String>>,
}

impl ResponseSelector {
    pub fn new(
        respond_from: ResponseSelection,
        destination_name_map: Arc<HashMap<String, String>>,
    ) -> Self {
        Self {
            respond_from,
            destination_name_map,
        }
    }

    pub fn respond_from(&self) -> &ResponseSelection {
        &self.respond_from
    }

    /// Response for a fully processed message
    pub fn select(&self, message: &Message) -> Option<Response> {
        match &self.respond_from {
            ResponseSelection::None => None,
            ResponseSelection::Auto => Some(Self::auto(message)),
            ResponseSelection::Destination(name) => {
                let key = self.destination_name_map.get(name)?;
                message
                    .merged_response_map()
                    .get(key)
                    .map(Self::response_from_value)
            }
            ResponseSelection::ResponseMap(key) => message
                .merged_response_map()
                .get(key)
                .map(Self::response_from_value),
        }
    }

    /// Response for a message acknowledged before processing
    pub fn select_queued(&self) -> Option<Response> {
        match self.respond_from {
            ResponseSelection::Auto => Some(Response::sent("")),
            _ => None,
        }
    }

    fn auto(message: &Message) -> Response {
        match message.source().map(|source| source.status()) {
            Some(Status::Error) => Response::error(
                "Error processing source message",
                message
                    .source()
                    .and_then(|s| s.processing_error.clone())
                    .unwrap_or_default(),
            ),
            Some(Status::Filtered) => Response::filtered("Message filtered at source"),
            _ => {
                if let Some(failed) = message.destinations().find(|d| d.status() == Status::Error) {
                    Response::error(
                        format!("Error sending to {}", failed.connector_name),
                        failed.processing_error.clone().unwrap_or_default(),
                    )
                } else if message.destinations().any(|d| d.status() == Status::Queued) {
                    Response::queued("Message queued for delivery", "")
                } else {
                    Response::sent("")
                }
            }
        }
    }

    fn response_from_value(value: &Value) -> Response {
        serde_json::from_value(value.clone()).unwrap_or_else(|_| match value {
            Value::String(s) => Response::sent(s.clone()),
            other => Response::sent(other.to_string()),
        })
    }
}
