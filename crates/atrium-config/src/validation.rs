// SPDX-FileCopyrightText: 2026 Atrium Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Semantic validation run after deserialization. Collects every problem
//! instead of stopping at the first one.

use std::collections::HashSet;

use crate::diagnostic::ConfigError;
use crate::model::{AtriumConfig, BusinessHoursConfig, DAY_NAMES, ResponderKind};

pub fn validate_config(config: &AtriumConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    if config.server.host.trim().is_empty() {
        errors.push(ConfigError::validation("server.host must not be empty"));
    }
    if config.storage.database_path.trim().is_empty() {
        errors.push(ConfigError::validation("storage.database_path must not be empty"));
    }

    let ingestion = &config.ingestion;
    for (name, value) in [
        ("ingestion.verify_timeout_ms", ingestion.verify_timeout_ms),
        ("ingestion.lock_secs", ingestion.lock_secs),
        ("ingestion.poll_interval_ms", ingestion.poll_interval_ms),
        ("responder.timeout_secs", config.responder.timeout_secs),
        ("routing.sweep_interval_secs", config.routing.sweep_interval_secs),
        ("realtime.heartbeat_secs", config.realtime.heartbeat_secs),
        ("realtime.stream_send_timeout_ms", config.realtime.stream_send_timeout_ms),
    ] {
        if value == 0 {
            errors.push(ConfigError::validation(format!("{name} must be greater than 0")));
        }
    }
    if ingestion.workers == 0 {
        errors.push(ConfigError::validation("ingestion.workers must be at least 1"));
    }
    if ingestion.max_attempts == 0 {
        errors.push(ConfigError::validation("ingestion.max_attempts must be at least 1"));
    }
    let batch_secs = u64::from(ingestion.batch_size).saturating_mul(config.responder.timeout_secs);
    if ingestion.lock_secs < batch_secs {
        errors.push(ConfigError::validation(format!(
            "ingestion.lock_secs ({}) must cover a whole batch: batch_size ({}) x responder.timeout_secs ({}) = {batch_secs}",
            ingestion.lock_secs, ingestion.batch_size, config.responder.timeout_secs
        )));
    }
    if ingestion.retry_max_secs < ingestion.retry_base_secs {
        errors.push(ConfigError::validation(format!(
            "ingestion.retry_max_secs ({}) must not be below retry_base_secs ({})",
            ingestion.retry_max_secs, ingestion.retry_base_secs
        )));
    }

    for (name, value) in [
        ("realtime.bus_capacity", config.realtime.bus_capacity),
        ("realtime.operator_buffer", config.realtime.operator_buffer),
        ("realtime.stream_buffer", config.realtime.stream_buffer),
    ] {
        if value == 0 {
            errors.push(ConfigError::validation(format!("{name} must be at least 1")));
        }
    }

    if config.responder.kind == ResponderKind::Http {
        let endpoint = config.responder.endpoint.as_deref().unwrap_or("");
        if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
            errors.push(ConfigError::validation(
                "responder.endpoint must be an http(s) URL when responder.kind = \"http\"",
            ));
        }
    }

    if !(0.0..=100.0).contains(&config.scoring.qualify_threshold) {
        errors.push(ConfigError::validation(format!(
            "scoring.qualify_threshold must be within 0..=100, got {}",
            config.scoring.qualify_threshold
        )));
    }

    validate_keywords("routing", &config.routing.transfer_keywords, &mut errors);
    if let Some(hours) = &config.routing.business_hours {
        validate_hours("routing.business_hours", hours, &mut errors);
    }

    let mut tenant_ids = HashSet::new();
    for (i, tenant) in config.tenants.iter().enumerate() {
        if tenant.id.trim().is_empty() {
            errors.push(ConfigError::validation(format!("tenants[{i}].id must not be empty")));
        } else if !tenant_ids.insert(tenant.id.as_str()) {
            errors.push(ConfigError::validation(format!(
                "duplicate tenant id `{}` in [[tenants]]",
                tenant.id
            )));
        }
        if let Some(keywords) = &tenant.transfer_keywords {
            validate_keywords(&format!("tenants[{i}]"), keywords, &mut errors);
        }
        if let Some(hours) = &tenant.business_hours {
            validate_hours(&format!("tenants[{i}].business_hours"), hours, &mut errors);
        }
    }

    let mut tokens = HashSet::new();
    for (i, op) in config.operators.iter().enumerate() {
        if op.token.len() < 16 {
            errors.push(ConfigError::validation(format!(
                "operators[{i}].token must be at least 16 characters"
            )));
        }
        if !tokens.insert(op.token.as_str()) {
            errors.push(ConfigError::validation(format!(
                "operators[{i}].token duplicates another operator's token"
            )));
        }
        if op.tenant_id.trim().is_empty() || op.operator_id.trim().is_empty() {
            errors.push(ConfigError::validation(format!(
                "operators[{i}] requires tenant_id and operator_id"
            )));
        }
    }

    if errors.is_empty() { Ok(()) } else { Err(errors) }
}

fn validate_keywords(scope: &str, keywords: &[String], errors: &mut Vec<ConfigError>) {
    if keywords.iter().any(|k| k.trim().is_empty()) {
        errors.push(ConfigError::validation(format!(
            "{scope}.transfer_keywords must not contain empty entries"
        )));
    }
}

fn validate_hours(scope: &str, hours: &BusinessHoursConfig, errors: &mut Vec<ConfigError>) {
    if hours.open_hour > 23 {
        errors.push(ConfigError::validation(format!(
            "{scope}.open_hour must be within 0..=23, got {}",
            hours.open_hour
        )));
    }
    if hours.close_hour == 0 || hours.close_hour > 24 || hours.close_hour <= hours.open_hour {
        errors.push(ConfigError::validation(format!(
            "{scope}.close_hour must be after open_hour and at most 24, got {}",
            hours.close_hour
        )));
    }
    if hours.utc_offset_minutes.abs() > 14 * 60 {
        errors.push(ConfigError::validation(format!(
            "{scope}.utc_offset_minutes is out of range: {}",
            hours.utc_offset_minutes
        )));
    }
    for day in &hours.days {
        if !DAY_NAMES.contains(&day.as_str()) {
            errors.push(ConfigError::validation(format!(
                "{scope}.days contains unknown day `{day}` (expected one of {})",
                DAY_NAMES.join(", ")
            )));
        }
    }
}
