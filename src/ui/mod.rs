/// Optional status surface for user-facing progress updates.
///
/// The engine tolerates the sink being absent; every call site treats a
/// missing sink as a no-op and a sink failure as non-fatal.
pub trait StatusSink: Send + Sync {
    fn subagent_status(&self, agent_name: &str, status: &str, details: &str);
}

/// Sink that forwards status updates to the tracing pipeline. Useful when no
/// interactive display is attached.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingStatusSink;

impl StatusSink for TracingStatusSink {
    fn subagent_status(&self, agent_name: &str, status: &str, details: &str) {
        if details.is_empty() {
            tracing::info!("[{}] {}", agent_name, status);
        } else {
            tracing::info!("[{}] {}: {}", agent_name, status, details);
        }
    }
}
