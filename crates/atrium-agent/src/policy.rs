// SPDX-FileCopyrightText: 2026 Atrium Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Handoff policy: when a conversation leaves the bot for the human queue.
//!
//! Triggers, in the order they are checked for an inbound message:
//! the tenant has the bot disabled, the message arrived outside business
//! hours with after-hours routing to humans, or the text contains a
//! transfer keyword. Consecutive bot fallbacks are checked on the reply.

use std::sync::Arc;

use atrium_config::model::{AtriumConfig, BusinessHoursConfig};
use atrium_core::AtriumError;
use atrium_core::types::{HandoffReason, TenantId};
use chrono::{DateTime, Datelike, Duration, Timelike, Utc, Weekday};
use dashmap::DashMap;
use regex::Regex;

/// Case-insensitive whole-word matcher over a keyword list.
///
/// "Quero um ATENDENTE!" matches `atendente`; "atendentes" does not.
/// Multi-word keywords tolerate any run of whitespace between words.
#[derive(Debug, Clone)]
pub struct KeywordMatcher {
    regex: Regex,
}

impl KeywordMatcher {
    /// Compiles the list into one alternation. Returns `None` for an empty
    /// list.
    pub fn new(keywords: &[String]) -> Result<Option<Self>, AtriumError> {
        let alternatives: Vec<String> = keywords
            .iter()
            .map(|k| {
                k.split_whitespace()
                    .map(regex::escape)
                    .collect::<Vec<_>>()
                    .join(r"\s+")
            })
            .filter(|k| !k.is_empty())
            .collect();
        if alternatives.is_empty() {
            return Ok(None);
        }
        let pattern = format!(r"(?i)\b(?:{})\b", alternatives.join("|"));
        let regex = Regex::new(&pattern)
            .map_err(|e| AtriumError::Config(format!("invalid transfer keywords: {e}")))?;
        Ok(Some(Self { regex }))
    }

    pub fn matches(&self, text: &str) -> bool {
        self.regex.is_match(text)
    }
}

pub struct HandoffPolicy {
    config: Arc<AtriumConfig>,
    matchers: DashMap<TenantId, Option<Arc<KeywordMatcher>>>,
}

impl HandoffPolicy {
    pub fn new(config: Arc<AtriumConfig>) -> Self {
        Self {
            config,
            matchers: DashMap::new(),
        }
    }

    /// Decides whether an inbound message hands the conversation off.
    pub fn inbound_reason(
        &self,
        tenant_id: &TenantId,
        text: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<HandoffReason>, AtriumError> {
        let policy = self.config.routing_for(tenant_id);
        if !policy.bot_enabled {
            return Ok(Some(HandoffReason::BotDisabled));
        }
        if policy.after_hours_to_human {
            if let Some(hours) = &policy.business_hours {
                if !within_business_hours(hours, now) {
                    return Ok(Some(HandoffReason::AfterHours));
                }
            }
        }
        if let Some(matcher) = self.matcher(tenant_id)? {
            if matcher.matches(text) {
                return Ok(Some(HandoffReason::Keyword));
            }
        }
        Ok(None)
    }

    /// Whether one more fallback reply reaches the tenant's failure limit.
    pub fn fallback_exhausted(&self, tenant_id: &TenantId, failures_so_far: i64) -> bool {
        let max = i64::from(self.config.routing_for(tenant_id).max_bot_failures);
        max > 0 && failures_so_far + 1 >= max
    }

    pub fn bot_enabled(&self, tenant_id: &TenantId) -> bool {
        self.config.routing_for(tenant_id).bot_enabled
    }

    fn matcher(&self, tenant_id: &TenantId) -> Result<Option<Arc<KeywordMatcher>>, AtriumError> {
        if let Some(cached) = self.matchers.get(tenant_id) {
            return Ok(cached.clone());
        }
        let keywords = self.config.routing_for(tenant_id).transfer_keywords;
        let matcher = KeywordMatcher::new(&keywords)?.map(Arc::new);
        self.matchers.insert(tenant_id.clone(), matcher.clone());
        Ok(matcher)
    }
}

/// Evaluates the weekly window in the configured fixed offset.
pub fn within_business_hours(hours: &BusinessHoursConfig, now: DateTime<Utc>) -> bool {
    let local = now + Duration::minutes(i64::from(hours.utc_offset_minutes));
    let day = match local.weekday() {
        Weekday::Mon => "mon",
        Weekday::Tue => "tue",
        Weekday::Wed => "wed",
        Weekday::Thu => "thu",
        Weekday::Fri => "fri",
        Weekday::Sat => "sat",
        Weekday::Sun => "sun",
    };
    hours.days.iter().any(|d| d == day)
        && local.hour() >= hours.open_hour
        && local.hour() < hours.close_hour
}
