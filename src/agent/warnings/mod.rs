/// Formats the remaining-turn warnings injected as the action budget decays.
///
/// Warnings are injected as user-role messages after a tool batch; the
/// formatter itself is pure.
#[derive(Debug, Clone)]
pub struct TurnWarningFormatter {
    threshold: u32,
    /// Batch-capable tool recommended for efficiency in the detailed warning.
    batch_tool: Option<String>,
}

impl Default for TurnWarningFormatter {
    fn default() -> Self {
        Self::new(5, None)
    }
}

impl TurnWarningFormatter {
    pub fn new(threshold: u32, batch_tool: Option<String>) -> Self {
        Self {
            threshold: threshold.max(1),
            batch_tool,
        }
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    /// Warning for `remaining` turns left, or `None` when no warning is due.
    pub fn format(&self, remaining: u32) -> Option<String> {
        if remaining == 0 || remaining > self.threshold {
            return None;
        }
        if remaining == 1 {
            return Some(
                "WARNING: This is your final turn. Provide your conclusion now; \
                 any further tool calls will not be executed."
                    .to_string(),
            );
        }
        if remaining == self.threshold {
            let batch_hint = self.batch_tool.as_ref().map_or_else(String::new, |tool| {
                format!(
                    " Consider using '{}' to batch related operations into a single turn.",
                    tool
                )
            });
            return Some(format!(
                "NOTE: Only {} turns remain. Prioritize the checks most likely to \
                 explain the problem and drop low-value exploration.{}",
                remaining, batch_hint
            ));
        }
        Some(format!("NOTE: {} turns remain.", remaining))
    }
}
