use super::*;
use std::time::Duration;

fn enforcer_with_allowlist(tools: &[&str]) -> SafetyEnforcer {
    SafetyEnforcer::new(
        Some(tools.iter().map(|t| (*t).to_string()).collect()),
        vec![],
        vec!["rm -rf".into(), "mkfs".into()],
        5,
    )
}

#[test]
fn allowlist_membership_required() {
    let enforcer = enforcer_with_allowlist(&["bash", "read_file"]);
    assert!(enforcer.check_tool_allowed("bash").is_ok());
    assert!(matches!(
        enforcer.check_tool_allowed("send_email"),
        Err(SleuthError::ToolNotAllowed { tool }) if tool == "send_email"
    ));
}

#[test]
fn empty_allowlist_blocks_everything() {
    let enforcer = SafetyEnforcer::new(Some(vec![]), vec![], vec![], 5);
    assert!(enforcer.check_tool_allowed("bash").is_err());
    assert!(enforcer.check_tool_allowed("read_file").is_err());
}

#[test]
fn no_allowlist_consults_blocklist() {
    let enforcer = SafetyEnforcer::new(None, vec!["spawn".into()], vec![], 5);
    assert!(enforcer.check_tool_allowed("bash").is_ok());
    assert!(enforcer.check_tool_allowed("spawn").is_err());
}

#[test]
fn blocked_command_prefix_match() {
    let enforcer = enforcer_with_allowlist(&["bash"]);
    assert!(matches!(
        enforcer.check_command_allowed("rm -rf /var/lib"),
        Err(SleuthError::CommandBlocked { .. })
    ));
    // Leading whitespace does not dodge the gate.
    assert!(enforcer.check_command_allowed("   rm -rf /").is_err());
    // A non-prefix occurrence is not matched.
    assert!(enforcer.check_command_allowed("echo rm -rf").is_ok());
    assert!(enforcer.check_command_allowed("uptime").is_ok());
}

#[test]
fn action_budget_boundary() {
    let enforcer = enforcer_with_allowlist(&["bash"]);
    assert!(enforcer.check_action_budget(4).is_ok());
    assert!(matches!(
        enforcer.check_action_budget(5),
        Err(SleuthError::ActionBudgetExceeded { max: 5 })
    ));
    assert!(enforcer.check_action_budget(6).is_err());
}

#[test]
fn checks_are_pure() {
    let enforcer = enforcer_with_allowlist(&["bash"]);
    for _ in 0..3 {
        assert!(enforcer.check_tool_allowed("bash").is_ok());
        assert!(enforcer.check_tool_allowed("other").is_err());
    }
}

#[test]
fn timeout_check_reflects_context() {
    let enforcer = SafetyEnforcer::permissive(5);
    let live = RunContext::new();
    assert!(enforcer.check_timeout(&live).is_ok());

    let expired = RunContext::new().with_deadline(Duration::ZERO);
    assert!(matches!(
        enforcer.check_timeout(&expired),
        Err(SleuthError::Timeout)
    ));

    let cancelled = RunContext::new();
    cancelled.cancel();
    assert!(matches!(
        enforcer.check_timeout(&cancelled),
        Err(SleuthError::Cancelled)
    ));
}
