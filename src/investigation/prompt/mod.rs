use crate::errors::SleuthError;
use crate::investigation::Alert;
use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::Arc;
use tracing::warn;

/// Cap on the alert description included in the prompt, to keep the prompt
/// bounded for arbitrary alert payloads.
const MAX_DESCRIPTION_CHARS: usize = 2000;

/// Composes the initial investigation prompt for one class of alerts.
pub trait PromptBuilder: Send + Sync {
    /// Alert-type key this builder registers under.
    fn alert_type(&self) -> &str;

    fn build(&self, alert: &Alert) -> String;
}

/// Fallback builder that renders a deterministic, bounded prompt from any
/// alert. Labels are emitted in sorted order so equal inputs yield equal
/// prompts.
#[derive(Debug, Clone, Copy, Default)]
pub struct GenericPromptBuilder;

impl PromptBuilder for GenericPromptBuilder {
    fn alert_type(&self) -> &str {
        "generic"
    }

    fn build(&self, alert: &Alert) -> String {
        let description: String = alert.description.chars().take(MAX_DESCRIPTION_CHARS).collect();
        let mut labels: Vec<(&String, &String)> = alert.labels.iter().collect();
        labels.sort();
        let mut label_block = String::new();
        for (key, value) in labels {
            let _ = writeln!(label_block, "- {}: {}", key, value);
        }
        if label_block.is_empty() {
            label_block.push_str("(none)\n");
        }

        format!(
            r"# Alert Investigation

An operational alert fired and needs a root-cause investigation.

## Alert
- id: {id}
- source: {source}
- severity: {severity}
- title: {title}

## Description
{description}

## Labels
{labels}
## Instructions
1. Form a hypothesis about the likely cause before running commands
2. Use the available tools to confirm or refute it
3. Stay focused on this alert; do not take remediation actions

Finish with a short report containing a `Findings:` section listing each
finding as a `- ` bullet, and a final `Confidence: <0.0-1.0>` line for how
certain you are of the root cause.",
            id = alert.id,
            source = alert.source,
            severity = alert.severity,
            title = alert.title,
            description = description,
            labels = label_block,
        )
    }
}

/// Keyed collection of prompt builders.
///
/// Builders are registered during initialization and never mutated at run
/// time. Specialized builders are retained for lookup, but prompt
/// composition always delegates to the generic builder.
pub struct PromptBuilderRegistry {
    builders: HashMap<String, Arc<dyn PromptBuilder>>,
    generic: GenericPromptBuilder,
}

impl Default for PromptBuilderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl PromptBuilderRegistry {
    pub fn new() -> Self {
        Self {
            builders: HashMap::new(),
            generic: GenericPromptBuilder,
        }
    }

    /// Register a builder under its alert-type key. Registering the same key
    /// replaces the previous builder.
    pub fn register(&mut self, builder: Arc<dyn PromptBuilder>) -> Result<(), SleuthError> {
        let key = builder.alert_type().to_string();
        if key.is_empty() {
            return Err(SleuthError::InvalidInput(
                "prompt builder alert type must not be empty".into(),
            ));
        }
        if self.builders.insert(key.clone(), builder).is_some() {
            warn!("prompt registry: replaced builder for alert type '{}'", key);
        }
        Ok(())
    }

    /// Look up a registered builder by alert-type key.
    pub fn get(&self, alert_type: &str) -> Result<Arc<dyn PromptBuilder>, SleuthError> {
        self.builders
            .get(alert_type)
            .cloned()
            .ok_or_else(|| SleuthError::PromptBuilderNotFound {
                alert_type: alert_type.to_string(),
            })
    }

    pub fn registered_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.builders.keys().cloned().collect();
        types.sort();
        types
    }

    /// Compose the initial prompt for an alert. Always delegates to the
    /// generic builder.
    pub fn build_prompt_for_alert(&self, alert: &Alert) -> Result<String, SleuthError> {
        if alert.id.is_empty() {
            return Err(SleuthError::InvalidAlert(
                "alert id must not be empty".into(),
            ));
        }
        Ok(self.generic.build(alert))
    }
}
