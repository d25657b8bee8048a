//! Trigger matching. First match wins: rules are tried in registration order
//! and only the first rule that fits the event is returned.

use std::sync::Arc;

use actionbot_core::types::{InboundMessage, InboundReaction};

use crate::registry::{Rule, Trigger};

/// First command or pattern rule matching `message`.
pub fn match_message<'a>(
    rules: &'a [Arc<Rule>],
    message: &InboundMessage,
    prefix: &str,
) -> Option<&'a Arc<Rule>> {
    rules.iter().find(|rule| {
        let hit = match &rule.trigger {
            Trigger::Command(keyword) => command_keyword(&message.content, prefix)
                .is_some_and(|word| word.to_lowercase() == *keyword),
            Trigger::Pattern(regex) => regex.is_match(&message.content),
            Trigger::Reaction(_) | Trigger::Scheduled { .. } => false,
        };
        hit && rule.admits(&message.channel_id, message.guild_id.as_deref())
    })
}

/// First reaction rule matching `reaction`.
pub fn match_reaction<'a>(
    rules: &'a [Arc<Rule>],
    reaction: &InboundReaction,
) -> Option<&'a Arc<Rule>> {
    rules.iter().find(|rule| {
        matches!(&rule.trigger, Trigger::Reaction(emoji) if *emoji == reaction.emoji)
            && rule.admits(&reaction.channel_id, reaction.guild_id.as_deref())
    })
}

/// Arguments following the command keyword, split on whitespace.
/// Empty when `content` is not a prefixed command.
pub fn command_args<'a>(content: &'a str, prefix: &str) -> Vec<&'a str> {
    strip_prefix(content, prefix)
        .map(|rest| rest.split_whitespace().skip(1).collect())
        .unwrap_or_default()
}

fn strip_prefix<'a>(content: &'a str, prefix: &str) -> Option<&'a str> {
    if prefix.is_empty() {
        return None;
    }
    content.trim_start().strip_prefix(prefix)
}

/// The first token after the prefix.
fn command_keyword<'a>(content: &'a str, prefix: &str) -> Option<&'a str> {
    strip_prefix(content, prefix)?.split_whitespace().next()
}
