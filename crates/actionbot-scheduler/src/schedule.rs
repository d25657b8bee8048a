//! Schedule expression parsing.
//! Cron fields are delegated to the `cron` crate (seconds resolution);
//! descriptors are expanded to their cron equivalents and `@every` is a
//! fixed interval measured from the previous fire.

use std::str::FromStr;
use std::time::Duration;

use actionbot_core::error::{ActionBotError, Result};
use chrono::{DateTime, Utc};

/// A parsed schedule.
#[derive(Debug, Clone)]
pub enum Schedule {
    /// Calendar schedule.
    Cron(Box<cron::Schedule>),
    /// Fixed interval.
    Every(Duration),
}

impl Schedule {
    /// Parse a schedule expression.
    pub fn parse(expression: &str) -> Result<Self> {
        let expr = expression.trim();
        if expr.is_empty() {
            return Err(ActionBotError::invalid_schedule(expression, "empty expression"));
        }

        if let Some(rest) = expr.strip_prefix("@every") {
            let interval = parse_duration(rest.trim())
                .map_err(|reason| ActionBotError::invalid_schedule(expression, reason))?;
            return Ok(Schedule::Every(interval));
        }

        let cron_expr = if expr.starts_with('@') {
            expand_descriptor(expr).ok_or_else(|| {
                ActionBotError::invalid_schedule(expression, "unknown descriptor")
            })?
        } else {
            let fields = expr.split_whitespace().count();
            if fields != 6 {
                return Err(ActionBotError::invalid_schedule(
                    expression,
                    format!("expected 6 fields (SEC MIN HOUR DOM MON DOW), got {fields}"),
                ));
            }
            expr
        };

        let schedule = cron::Schedule::from_str(cron_expr)
            .map_err(|e| ActionBotError::invalid_schedule(expression, e.to_string()))?;
        Ok(Schedule::Cron(Box::new(schedule)))
    }

    /// First fire strictly after `after`.
    pub fn next_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Schedule::Cron(schedule) => schedule.after(&after).next(),
            Schedule::Every(interval) => {
                let step = chrono::Duration::from_std(*interval).ok()?;
                Some(after + step)
            }
        }
    }
}

fn expand_descriptor(descriptor: &str) -> Option<&'static str> {
    match descriptor {
        "@yearly" | "@annually" => Some("0 0 0 1 1 *"),
        "@monthly" => Some("0 0 0 1 * *"),
        "@weekly" => Some("0 0 0 * * Sun"),
        "@daily" | "@midnight" => Some("0 0 0 * * *"),
        "@hourly" => Some("0 0 * * * *"),
        _ => None,
    }
}

/// Parse durations like `1s`, `500ms`, `1m30s`, `2h`.
fn parse_duration(text: &str) -> std::result::Result<Duration, String> {
    if text.is_empty() {
        return Err("missing interval after @every".into());
    }

    let mut total = Duration::ZERO;
    let mut chars = text.chars().peekable();
    while chars.peek().is_some() {
        let mut digits = String::new();
        while let Some(c) = chars.peek().copied().filter(char::is_ascii_digit) {
            digits.push(c);
            chars.next();
        }
        if digits.is_empty() {
            return Err(format!("invalid duration '{text}'"));
        }
        let value: u64 = digits
            .parse()
            .map_err(|_| format!("invalid duration '{text}'"))?;

        let mut unit = String::new();
        while let Some(c) = chars.peek().copied().filter(char::is_ascii_alphabetic) {
            unit.push(c);
            chars.next();
        }
        let too_large = || format!("interval too large in '{text}'");
        let part = match unit.as_str() {
            "ms" => Duration::from_millis(value),
            "s" => Duration::from_secs(value),
            "m" => Duration::from_secs(value.checked_mul(60).ok_or_else(too_large)?),
            "h" => Duration::from_secs(value.checked_mul(3600).ok_or_else(too_large)?),
            "" => return Err(format!("missing unit in duration '{text}'")),
            other => return Err(format!("unknown unit '{other}' in duration '{text}'")),
        };
        total = total.checked_add(part).ok_or_else(too_large)?;
    }

    if total.is_zero() {
        return Err("interval must be positive".into());
    }
    Ok(total)
}
