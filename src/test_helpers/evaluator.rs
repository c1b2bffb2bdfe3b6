//! Tiny script language for exercising pipelines without a real engine.
//!
//! Filter rules: `accept`, `reject`, `fail`, `contains:<text>`,
//! `channel:<key>=<value>`.
//!
//! Transformer steps: `uppercase`, `append:<text>`, `replace:<from>=<to>`,
//! `fail`, `set_channel:<key>=<value>`, `set_response:<key>=<value>`,
//! `set_global:<key>=<value>`, `sleep:<ms>`, `response_status:<STATUS>`.
//!
//! Anything else fails to compile.

use crate::config::{FilterRule, RuleOperator};
use crate::message::Status;
use crate::pipeline::{
    EvaluationOutcome, FilterTransformerProgram, MessageScope, ProgramKind, ScriptError,
    ScriptEvaluator, ScriptHandle, ScriptPhase,
};
use dashmap::DashMap;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

#[derive(Debug, Default)]
pub struct ScriptedEvaluator {
    programs: DashMap<String, FilterTransformerProgram>,
    next_handle: AtomicU64,
    compiled: AtomicUsize,
    evaluated: AtomicUsize,
    disposed: AtomicUsize,
}

impl ScriptedEvaluator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn compiled(&self) -> usize {
        self.compiled.load(Ordering::SeqCst)
    }

    pub fn evaluated(&self) -> usize {
        self.evaluated.load(Ordering::SeqCst)
    }

    pub fn disposed(&self) -> usize {
        self.disposed.load(Ordering::SeqCst)
    }

    /// Programs currently compiled and not yet disposed
    pub fn live_programs(&self) -> usize {
        self.programs.len()
    }

    fn check_rule(script: &str) -> bool {
        matches!(script, "accept" | "reject" | "fail")
            || script.starts_with("contains:")
            || split_pair(script, "channel:").is_some()
    }

    fn check_step(script: &str) -> bool {
        matches!(script, "uppercase" | "fail")
            || script.starts_with("append:")
            || split_pair(script, "replace:").is_some()
            || split_pair(script, "set_channel:").is_some()
            || split_pair(script, "set_response:").is_some()
            || split_pair(script, "set_global:").is_some()
            || script
                .strip_prefix("sleep:")
                .is_some_and(|ms| ms.parse::<u64>().is_ok())
            || script
                .strip_prefix("response_status:")
                .is_some_and(|s| parse_status(s).is_some())
    }

    fn rule_passes(rule: &FilterRule, scope: &MessageScope) -> Result<bool, ScriptError> {
        let script = rule.script.as_str();
        if script == "fail" {
            return Err(ScriptError::new(ScriptPhase::Filter, format!("rule '{}' failed", rule.name))
                .at_line(1));
        }
        if let Some(text) = script.strip_prefix("contains:") {
            return Ok(scope.message.contains(text));
        }
        if let Some((key, value)) = split_pair(script, "channel:") {
            return Ok(scope
                .channel_map
                .get(key)
                .and_then(Value::as_str)
                .is_some_and(|v| v == value));
        }
        Ok(script == "accept")
    }

    fn apply_step(
        script: &str,
        name: &str,
        content: &mut String,
        scope: &mut MessageScope,
    ) -> Result<(), ScriptError> {
        if script == "fail" {
            return Err(ScriptError::new(
                ScriptPhase::Transformer,
                format!("step '{name}' failed"),
            )
            .with_context(name.to_string()));
        }
        if script == "uppercase" {
            *content = content.to_uppercase();
        } else if let Some(suffix) = script.strip_prefix("append:") {
            content.push_str(suffix);
        } else if let Some((from, to)) = split_pair(script, "replace:") {
            *content = content.replace(from, to);
        } else if let Some((key, value)) = split_pair(script, "set_channel:") {
            scope
                .channel_map
                .insert(key.to_string(), Value::String(value.to_string()));
        } else if let Some((key, value)) = split_pair(script, "set_response:") {
            scope
                .response_map
                .insert(key.to_string(), Value::String(value.to_string()));
        } else if let Some((key, value)) = split_pair(script, "set_global:") {
            scope
                .global_channel_map
                .put(key, Value::String(value.to_string()));
        } else if let Some(ms) = script.strip_prefix("sleep:") {
            let ms = ms.parse::<u64>().unwrap_or_default();
            std::thread::sleep(Duration::from_millis(ms));
        } else if let Some(status) = script.strip_prefix("response_status:") {
            if let (Some(response), Some(status)) = (scope.response.as_mut(), parse_status(status)) {
                response.status = status;
            }
        }
        Ok(())
    }
}

fn split_pair<'a>(script: &'a str, prefix: &str) -> Option<(&'a str, &'a str)> {
    script.strip_prefix(prefix)?.split_once('=')
}

fn parse_status(value: &str) -> Option<Status> {
    serde_json::from_value(Value::String(value.to_string())).ok()
}

impl ScriptEvaluator for ScriptedEvaluator {
    fn compile(&self, program: &FilterTransformerProgram) -> Result<ScriptHandle, ScriptError> {
        for (index, rule) in program.rules.iter().enumerate() {
            if !Self::check_rule(&rule.script) {
                return Err(ScriptError::new(
                    ScriptPhase::Filter,
                    format!("unknown rule '{}'", rule.script),
                )
                .at_line(index as u32 + 1));
            }
        }
        for (index, step) in program.steps.iter().enumerate() {
            if !Self::check_step(&step.script) {
                return Err(ScriptError::new(
                    ScriptPhase::Transformer,
                    format!("unknown step '{}'", step.script),
                )
                .at_line(index as u32 + 1));
            }
        }

        let id = self.next_handle.fetch_add(1, Ordering::SeqCst);
        let handle = ScriptHandle::new(format!(
            "{}:{}:{}",
            program.channel_id, program.metadata_id, id
        ));
        self.programs.insert(handle.0.clone(), program.clone());
        self.compiled.fetch_add(1, Ordering::SeqCst);
        Ok(handle)
    }

    fn evaluate(
        &self,
        handle: &ScriptHandle,
        mut scope: MessageScope,
    ) -> Result<EvaluationOutcome, ScriptError> {
        self.evaluated.fetch_add(1, Ordering::SeqCst);
        let program = self
            .programs
            .get(&handle.0)
            .map(|p| p.clone())
            .ok_or_else(|| {
                ScriptError::new(ScriptPhase::Transformer, format!("unknown handle {}", handle.0))
            })?;

        let mut accepted: Option<bool> = None;
        for rule in &program.rules {
            let passes = Self::rule_passes(rule, &scope)?;
            accepted = Some(match (accepted, rule.operator) {
                (None, _) => passes,
                (Some(previous), RuleOperator::And) => previous && passes,
                (Some(previous), RuleOperator::Or) => previous || passes,
            });
        }
        if accepted == Some(false) {
            return Ok(EvaluationOutcome::reject(scope));
        }

        let mut content = match program.kind {
            ProgramKind::FilterTransformer => scope
                .template
                .clone()
                .unwrap_or_else(|| scope.message.clone()),
            ProgramKind::ResponseTransformer => scope.message.clone(),
        };
        for step in &program.steps {
            Self::apply_step(&step.script, &step.name, &mut content, &mut scope)?;
        }

        Ok(EvaluationOutcome::accept(scope, content))
    }

    fn dispose(&self, handle: &ScriptHandle) {
        if self.programs.remove(&handle.0).is_some() {
            self.disposed.fetch_add(1, Ordering::SeqCst);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TransformerStep;

    fn program(rules: Vec<FilterRule>, steps: Vec<TransformerStep>) -> FilterTransformerProgram {
        FilterTransformerProgram {
            channel_id: "adt".to_string(),
            connector_name: "Source".to_string(),
            metadata_id: 0,
            kind: ProgramKind::FilterTransformer,
            rules,
            steps,
            template: None,
        }
    }

    #[test]
    fn test_unknown_step_fails_compile_with_line() {
        let evaluator = ScriptedEvaluator::new();
        let err = evaluator
            .compile(&program(
                Vec::new(),
                vec![
                    TransformerStep {
                        name: "ok".into(),
                        script: "uppercase".into(),
                    },
                    TransformerStep {
                        name: "bad".into(),
                        script: "launch_rockets".into(),
                    },
                ],
            ))
            .unwrap_err();
        assert_eq!(err.line, Some(2));
        assert_eq!(evaluator.compiled(), 0);
    }

    #[test]
    fn test_dispose_counts_once() {
        let evaluator = ScriptedEvaluator::new();
        let handle = evaluator.compile(&program(Vec::new(), Vec::new())).unwrap();
        evaluator.dispose(&handle);
        evaluator.dispose(&handle);
        assert_eq!(evaluator.disposed(), 1);
        assert_eq!(evaluator.live_programs(), 0);
    }
}
