//! Condition evaluation — the gate between a matched rule and its response.
//!
//! Evaluation never errors: lookups that fail are logged and the condition
//! fails closed.

use std::sync::Arc;

use actionbot_core::config::{ConditionConfig, ConditionKind, ConditionOperator};
use actionbot_core::traits::{AuthProvider, ResponseExecutor};
use actionbot_core::types::EventContext;

use crate::registry::Rule;

/// Checks `require_auth` and the rule's conditions against an event.
pub struct ConditionEvaluator {
    executor: Arc<dyn ResponseExecutor>,
    auth: Option<Arc<dyn AuthProvider>>,
}

impl ConditionEvaluator {
    pub fn new(executor: Arc<dyn ResponseExecutor>, auth: Option<Arc<dyn AuthProvider>>) -> Self {
        Self { executor, auth }
    }

    /// `true` when the event may run the rule.
    pub async fn evaluate(&self, event: &EventContext, rule: &Rule) -> bool {
        if rule.require_auth && !self.check_auth(event, rule).await {
            return false;
        }

        for condition in &rule.conditions {
            if !self.check(event, condition).await {
                tracing::debug!(
                    "Condition {:?} failed for rule '{}' (caller {})",
                    condition.kind,
                    rule.name,
                    event.caller()
                );
                return false;
            }
        }
        true
    }

    async fn check_auth(&self, event: &EventContext, rule: &Rule) -> bool {
        let Some(auth) = &self.auth else {
            tracing::warn!(
                "⚠️ Rule '{}' requires auth but no auth provider is configured",
                rule.name
            );
            return false;
        };

        let caller = event.caller();
        if auth.is_authenticated(caller).await {
            return true;
        }

        let notice = format!(
            "This command requires authentication. Please authenticate here: {}",
            auth.auth_url(caller)
        );
        if let Err(e) = self.executor.send_text(&event.channel_id, &notice).await {
            tracing::error!(
                "❌ Failed to send auth notice for rule '{}' in {}: {e}",
                rule.name,
                event.channel_id
            );
        }
        false
    }

    async fn check(&self, event: &EventContext, condition: &ConditionConfig) -> bool {
        let op = condition.operator;
        match condition.kind {
            ConditionKind::Channel => compare(&event.channel_id, &condition.value, op),
            ConditionKind::Guild => compare(event.guild(), &condition.value, op),
            ConditionKind::User => compare(event.caller(), &condition.value, op),
            ConditionKind::Role => {
                let Some(guild) = event.guild_id.as_deref() else {
                    return false;
                };
                match self.executor.fetch_roles(guild, event.caller()).await {
                    Ok(roles) => {
                        let has_role = roles.iter().any(|r| *r == condition.value);
                        has_role == (op == ConditionOperator::Equals)
                    }
                    Err(e) => {
                        tracing::error!("❌ Failed to fetch roles for {}: {e}", event.caller());
                        false
                    }
                }
            }
            ConditionKind::Permission => {
                if event.guild_id.is_none() {
                    return false;
                }
                match self
                    .executor
                    .fetch_permission_mask(event.caller(), &event.channel_id)
                    .await
                {
                    Ok(mask) => mask != 0,
                    Err(e) => {
                        tracing::error!(
                            "❌ Failed to fetch permissions for {}: {e}",
                            event.caller()
                        );
                        false
                    }
                }
            }
        }
    }
}

fn compare(actual: &str, expected: &str, op: ConditionOperator) -> bool {
    match op {
        ConditionOperator::Equals => actual == expected,
        ConditionOperator::Not => actual != expected,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{Call, RecordingExecutor, StaticAuth};
    use actionbot_core::config::{ActionConfig, ResponseConfig, TriggerConfig, TriggerKind};
    use actionbot_core::types::InboundMessage;

    fn rule(conditions: Vec<ConditionConfig>, require_auth: bool) -> Rule {
        Rule::compile(&ActionConfig {
            name: "guarded".into(),
            description: String::new(),
            kind: TriggerKind::Command,
            trigger: TriggerConfig {
                command: Some("guarded".into()),
                ..Default::default()
            },
            response: ResponseConfig::text("ok"),
            conditions,
            rate_limit: None,
            require_auth,
        })
        .unwrap()
    }

    fn cond(kind: ConditionKind, value: &str, operator: ConditionOperator) -> ConditionConfig {
        ConditionConfig {
            kind,
            value: value.into(),
            operator,
        }
    }

    fn event(guild: Option<&str>) -> EventContext {
        let mut msg = InboundMessage::new("m1", "c1", "alice", "!guarded");
        if let Some(g) = guild {
            msg = msg.in_guild(g);
        }
        EventContext::from(&msg)
    }

    fn evaluator(executor: RecordingExecutor) -> (ConditionEvaluator, Arc<RecordingExecutor>) {
        let executor = Arc::new(executor);
        (ConditionEvaluator::new(executor.clone(), None), executor)
    }

    #[tokio::test]
    async fn test_no_conditions_pass() {
        let (eval, _) = evaluator(RecordingExecutor::new());
        assert!(eval.evaluate(&event(None), &rule(vec![], false)).await);
    }

    #[tokio::test]
    async fn test_equals_and_not() {
        let (eval, _) = evaluator(RecordingExecutor::new());
        let ev = event(Some("g1"));
        use ConditionKind::*;
        use ConditionOperator::*;

        assert!(eval.evaluate(&ev, &rule(vec![cond(Channel, "c1", Equals)], false)).await);
        assert!(!eval.evaluate(&ev, &rule(vec![cond(Channel, "c1", Not)], false)).await);
        assert!(eval.evaluate(&ev, &rule(vec![cond(User, "bob", Not)], false)).await);
        assert!(eval.evaluate(&ev, &rule(vec![cond(Guild, "g1", Equals)], false)).await);
        // AND across conditions
        let both = vec![cond(User, "alice", Equals), cond(Channel, "c2", Equals)];
        assert!(!eval.evaluate(&ev, &rule(both, false)).await);
    }

    #[tokio::test]
    async fn test_role_condition() {
        let (eval, _) = evaluator(RecordingExecutor::new().with_roles("alice", &["mod"]));
        let mods = rule(vec![cond(ConditionKind::Role, "mod", ConditionOperator::Equals)], false);
        let admins = rule(vec![cond(ConditionKind::Role, "admin", ConditionOperator::Equals)], false);

        assert!(eval.evaluate(&event(Some("g1")), &mods).await);
        assert!(!eval.evaluate(&event(Some("g1")), &admins).await);
        // roles need a guild
        assert!(!eval.evaluate(&event(None), &mods).await);
    }

    #[tokio::test]
    async fn test_lookup_failure_fails_closed() {
        let (eval, _) = evaluator(RecordingExecutor::new().failing_lookups());
        let role = rule(vec![cond(ConditionKind::Role, "mod", ConditionOperator::Not)], false);
        let perm = rule(vec![cond(ConditionKind::Permission, "8", ConditionOperator::Equals)], false);
        assert!(!eval.evaluate(&event(Some("g1")), &role).await);
        assert!(!eval.evaluate(&event(Some("g1")), &perm).await);
    }

    #[tokio::test]
    async fn test_permission_nonzero_allows() {
        let perm = rule(vec![cond(ConditionKind::Permission, "8", ConditionOperator::Equals)], false);

        let (eval, _) = evaluator(RecordingExecutor::new().with_permissions(0x40));
        assert!(eval.evaluate(&event(Some("g1")), &perm).await);
        assert!(!eval.evaluate(&event(None), &perm).await);

        let (eval, _) = evaluator(RecordingExecutor::new());
        assert!(!eval.evaluate(&event(Some("g1")), &perm).await);
    }

    #[tokio::test]
    async fn test_require_auth_without_provider() {
        let (eval, executor) = evaluator(RecordingExecutor::new());
        assert!(!eval.evaluate(&event(None), &rule(vec![], true)).await);
        assert!(executor.calls().is_empty());
    }

    #[tokio::test]
    async fn test_require_auth_sends_notice() {
        let executor = Arc::new(RecordingExecutor::new());
        let auth: Arc<dyn AuthProvider> = Arc::new(StaticAuth::new(&["bob"]));
        let eval = ConditionEvaluator::new(executor.clone(), Some(auth));
        let guarded = rule(vec![], true);

        assert!(!eval.evaluate(&event(None), &guarded).await);
        assert_eq!(
            executor.calls(),
            vec![Call::Text {
                channel: "c1".into(),
                content: "This command requires authentication. Please authenticate here: \
                          https://auth.example.com/login?user=alice"
                    .into(),
            }]
        );

        let bob = EventContext::from(&InboundMessage::new("m2", "c1", "bob", "!guarded"));
        assert!(eval.evaluate(&bob, &guarded).await);
        assert_eq!(executor.calls().len(), 1);
    }
}
