// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Automation gate evaluation.
//!
//! Each evaluation is a pure question over injected inputs: the automation
//! definition, the current time, the persistence seams (`last_run` and the
//! event cursor), and the event provider. Nothing here mutates state; the
//! controller that dispatches due automations records runs and advances
//! cursors.
//!
//! Cron grammar is intentionally minimal: each of the five fields is `*`,
//! one integer, or a comma-separated integer list. Ranges (`1-5`), steps
//! (`*/15`), and names are not supported.

use chrono::{DateTime, Datelike, FixedOffset, Timelike};
use gc_core::{format_elapsed, parse_duration};
use gc_formula::{Automation, GateKind};
use gc_storage::{EventFilter, EventProvider, RecorderError};
use thiserror::Error;
use tracing::debug;

/// Errors from gate evaluation
#[derive(Debug, Error)]
pub enum GateError {
    /// The automation's gate parameters are unusable (config error).
    #[error("gate config for {name}: {message}")]
    Config { name: String, message: String },

    /// A condition check command could not be run at all.
    #[error("condition check failed to run: {0}")]
    Check(String),

    /// The event provider failed.
    #[error(transparent)]
    Events(#[from] RecorderError),
}

/// Outcome of one gate evaluation; produced fresh each time.
#[derive(Debug, Clone, PartialEq)]
pub struct GateResult {
    pub due: bool,
    pub reason: String,
    pub last_run: Option<DateTime<FixedOffset>>,
}

impl GateResult {
    fn due(reason: impl Into<String>) -> Self {
        Self {
            due: true,
            reason: reason.into(),
            last_run: None,
        }
    }

    fn not_due(reason: impl Into<String>) -> Self {
        Self {
            due: false,
            reason: reason.into(),
            last_run: None,
        }
    }

    fn with_last_run(mut self, last_run: Option<DateTime<FixedOffset>>) -> Self {
        self.last_run = last_run;
        self
    }
}

/// Persistence seams the gate engine reads.
///
/// All queries use the automation's scoped name so rig-scoped and
/// city-scoped automations of the same bare name never collide.
pub trait GateStore: Send + Sync {
    /// When the automation last ran; `None` when it never has.
    fn last_run(&self, scoped_name: &str) -> Option<DateTime<FixedOffset>>;

    /// Highest event seq already dispatched for this automation.
    fn cursor(&self, scoped_name: &str) -> u64;
}

/// Decide whether `automation` is due at `now`.
pub async fn evaluate(
    automation: &Automation,
    now: DateTime<FixedOffset>,
    store: &dyn GateStore,
    events: &dyn EventProvider,
) -> Result<GateResult, GateError> {
    let scoped = automation.scoped_name();
    let last_run = store.last_run(&scoped);

    let result = match automation.gate {
        GateKind::Cooldown => cooldown_gate(automation, now, last_run)?,
        GateKind::Cron => cron_gate(automation, now, last_run)?,
        GateKind::Condition => condition_gate(automation).await?,
        GateKind::Event => event_gate(automation, store.cursor(&scoped), events).await?,
        GateKind::Manual => GateResult::not_due("manual: run it explicitly"),
    };

    debug!(automation = %scoped, due = result.due, reason = %result.reason, "gate evaluated");
    Ok(result.with_last_run(last_run))
}

fn config_error(automation: &Automation, message: impl Into<String>) -> GateError {
    GateError::Config {
        name: automation.scoped_name(),
        message: message.into(),
    }
}

fn cooldown_gate(
    automation: &Automation,
    now: DateTime<FixedOffset>,
    last_run: Option<DateTime<FixedOffset>>,
) -> Result<GateResult, GateError> {
    if automation.interval.is_empty() {
        return Err(config_error(automation, "cooldown gate requires interval"));
    }
    let interval = parse_duration(&automation.interval).map_err(|e| config_error(automation, e))?;

    let Some(last) = last_run else {
        return Ok(GateResult::due("never run"));
    };

    let elapsed = (now - last).to_std().unwrap_or_default();
    if elapsed >= interval {
        Ok(GateResult::due(format!(
            "cooldown elapsed ({} since last run)",
            format_elapsed(elapsed.as_secs())
        )))
    } else {
        let remaining = interval - elapsed;
        Ok(GateResult::not_due(format!(
            "cooldown: {} remaining",
            format_elapsed(remaining.as_secs())
        )))
    }
}

fn cron_gate(
    automation: &Automation,
    now: DateTime<FixedOffset>,
    last_run: Option<DateTime<FixedOffset>>,
) -> Result<GateResult, GateError> {
    if automation.schedule.is_empty() {
        return Err(config_error(automation, "cron gate requires schedule"));
    }
    let schedule =
        CronSchedule::parse(&automation.schedule).map_err(|e| config_error(automation, e))?;

    if !schedule.matches(now) {
        return Ok(GateResult::not_due(format!(
            "cron: {} not matched",
            automation.schedule
        )));
    }

    // Debounce: one firing per matched minute
    if let Some(last) = last_run {
        if truncate_to_minute(last.with_timezone(&now.timezone())) == truncate_to_minute(now) {
            return Ok(GateResult::not_due("cron: already ran this minute"));
        }
    }

    Ok(GateResult::due(format!(
        "cron: {} matched",
        automation.schedule
    )))
}

async fn condition_gate(automation: &Automation) -> Result<GateResult, GateError> {
    if automation.check.is_empty() {
        return Err(config_error(automation, "condition gate requires check"));
    }

    let output = tokio::process::Command::new("sh")
        .arg("-c")
        .arg(&automation.check)
        .output()
        .await
        .map_err(|e| GateError::Check(e.to_string()))?;

    if output.status.success() {
        Ok(GateResult::due("condition passed"))
    } else {
        Ok(GateResult::not_due(format!(
            "condition exited {}",
            output.status.code().unwrap_or(-1)
        )))
    }
}

async fn event_gate(
    automation: &Automation,
    cursor: u64,
    events: &dyn EventProvider,
) -> Result<GateResult, GateError> {
    if automation.on.is_empty() {
        return Err(config_error(automation, "event gate requires on"));
    }

    let filter = EventFilter::new().kind(automation.on.as_str()).after_seq(cursor);
    let matched = events.list(&filter).await?;

    if matched.is_empty() {
        Ok(GateResult::not_due(format!(
            "no {} events past seq {}",
            automation.on, cursor
        )))
    } else {
        Ok(GateResult::due(format!(
            "event: {} {} event(s)",
            matched.len(),
            automation.on
        )))
    }
}

fn truncate_to_minute(t: DateTime<FixedOffset>) -> DateTime<FixedOffset> {
    t.with_second(0)
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(t)
}

/// One parsed cron field: `*` or an integer set.
#[derive(Debug, Clone, PartialEq, Eq)]
struct CronField {
    /// Empty means `*`.
    values: Vec<u32>,
}

impl CronField {
    fn parse(field: &str, min: u32, max: u32) -> Result<Self, String> {
        if field == "*" {
            return Ok(Self { values: Vec::new() });
        }
        let mut values = Vec::new();
        for part in field.split(',') {
            let value: u32 = part
                .parse()
                .map_err(|_| format!("bad cron field value: {}", part))?;
            if value < min || value > max {
                return Err(format!(
                    "cron field value {} outside {}..={}",
                    value, min, max
                ));
            }
            values.push(value);
        }
        Ok(Self { values })
    }

    fn matches(&self, value: u32) -> bool {
        self.values.is_empty() || self.values.contains(&value)
    }
}

/// Minimal 5-field cron schedule: minute, hour, day-of-month, month,
/// day-of-week (0 = Sunday).
#[derive(Debug, Clone, PartialEq, Eq)]
struct CronSchedule {
    minute: CronField,
    hour: CronField,
    day_of_month: CronField,
    month: CronField,
    day_of_week: CronField,
}

impl CronSchedule {
    fn parse(schedule: &str) -> Result<Self, String> {
        let fields: Vec<&str> = schedule.split_whitespace().collect();
        if fields.len() != 5 {
            return Err(format!(
                "cron schedule needs 5 fields, got {}",
                fields.len()
            ));
        }
        Ok(Self {
            minute: CronField::parse(fields[0], 0, 59)?,
            hour: CronField::parse(fields[1], 0, 23)?,
            day_of_month: CronField::parse(fields[2], 1, 31)?,
            month: CronField::parse(fields[3], 1, 12)?,
            day_of_week: CronField::parse(fields[4], 0, 6)?,
        })
    }

    fn matches(&self, t: DateTime<FixedOffset>) -> bool {
        self.minute.matches(t.minute())
            && self.hour.matches(t.hour())
            && self.day_of_month.matches(t.day())
            && self.month.matches(t.month())
            && self.day_of_week.matches(t.weekday().num_days_from_sunday())
    }
}

#[cfg(test)]
#[path = "gate_tests.rs"]
mod tests;
