use super::*;
use crate::convo::ThinkingInfo;

#[test]
fn fresh_context_is_live() {
    let ctx = RunContext::new();
    assert!(!ctx.is_cancelled());
    assert!(ctx.check().is_ok());
    assert!(!ctx.is_subagent());
    assert_eq!(ctx.depth(), 0);
}

#[test]
fn cancel_propagates_to_children() {
    let parent = RunContext::new();
    let child = parent.with_subagent("sub-1", None);
    parent.cancel();
    assert!(child.is_cancelled());
    assert!(matches!(child.check(), Err(SleuthError::Cancelled)));
}

#[test]
fn child_cancel_does_not_reach_parent() {
    let parent = RunContext::new();
    let child = parent.with_subagent("sub-1", None);
    child.cancel();
    assert!(!parent.is_cancelled());
}

#[test]
fn subagent_marker_and_depth() {
    let ctx = RunContext::new();
    let first = ctx.with_subagent("sub-1", Some("sess-0".into()));
    assert!(first.is_subagent());
    assert_eq!(first.depth(), 1);
    assert_eq!(
        first.subagent().map(|s| s.subagent_id.as_str()),
        Some("sub-1")
    );

    let nested = first.with_subagent("sub-2", Some("sess-1".into()));
    assert_eq!(nested.depth(), 2);
}

#[test]
fn elapsed_deadline_reports_timeout() {
    let ctx = RunContext::new().with_deadline(Duration::ZERO);
    assert!(ctx.is_cancelled());
    assert!(matches!(ctx.check(), Err(SleuthError::Timeout)));
}

#[test]
fn tighter_parent_deadline_wins() {
    let parent = RunContext::new().with_deadline(Duration::from_millis(10));
    let child = parent.with_deadline(Duration::from_secs(3600));
    let remaining = child.remaining().expect("deadline set");
    assert!(remaining <= Duration::from_millis(10));
}

#[test]
fn thinking_override_carried() {
    let info = ThinkingInfo {
        enabled: true,
        budget_tokens: 4096,
        show_thinking: false,
    };
    let ctx = RunContext::new().with_thinking(info);
    assert_eq!(ctx.thinking(), Some(info));
    // Derived contexts inherit the override.
    let child = ctx.with_subagent("sub-1", None);
    assert_eq!(child.thinking(), Some(info));
}

#[tokio::test]
async fn done_completes_on_cancel() {
    let ctx = RunContext::new();
    let waiter = ctx.clone();
    let handle = tokio::spawn(async move { waiter.done().await });
    ctx.cancel();
    tokio::time::timeout(Duration::from_secs(1), handle)
        .await
        .expect("done() should resolve after cancel")
        .expect("task should not panic");
}

#[tokio::test]
async fn done_completes_on_deadline() {
    let ctx = RunContext::new().with_deadline(Duration::from_millis(20));
    tokio::time::timeout(Duration::from_secs(1), ctx.done())
        .await
        .expect("done() should resolve at deadline");
}
