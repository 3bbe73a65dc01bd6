// SPDX-FileCopyrightText: 2026 Atrium Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Integration tests for the Atrium configuration system.

use atrium_config::diagnostic::ConfigError;
use atrium_config::model::ResponderKind;
use atrium_config::{load_and_validate_str, load_config_from_path, load_config_from_str};
use atrium_core::types::{ChannelType, TenantId};

#[test]
fn full_config_deserializes() {
    let toml = r#"
[log]
level = "debug"

[server]
host = "0.0.0.0"
port = 9090

[storage]
database_path = "/tmp/atrium-test.db"
wal_mode = false

[ingestion]
verify_timeout_ms = 1500
workers = 2

[responder]
kind = "http"
endpoint = "http://localhost:7000/reply"
timeout_secs = 5

[routing]
transfer_keywords = ["atendente", "falar com humano"]
max_bot_failures = 2
after_hours_to_human = true
sla_max_wait_secs = 60

[routing.business_hours]
utc_offset_minutes = -180
days = ["mon", "tue", "wed", "thu", "fri", "sat"]
open_hour = 7
close_hour = 19

[realtime]
operator_buffer = 32

[scoring]
qualify_threshold = 55.0

[[tenants]]
id = "clinica-sorriso"
bot_enabled = false

[[operators]]
token = "op-token-0123456789"
tenant_id = "clinica-sorriso"
operator_id = "ana"
name = "Ana"
skills = ["whatsapp", "webchat"]
"#;

    let config = load_and_validate_str(toml).expect("valid config");
    assert_eq!(config.log.level, "debug");
    assert_eq!(config.server.port, 9090);
    assert!(!config.storage.wal_mode);
    assert_eq!(config.ingestion.verify_timeout_ms, 1500);
    assert_eq!(config.ingestion.max_attempts, 5);
    assert_eq!(config.responder.kind, ResponderKind::Http);
    assert_eq!(config.routing.max_bot_failures, 2);
    let hours = config.routing.business_hours.as_ref().expect("hours");
    assert_eq!(hours.utc_offset_minutes, -180);
    assert_eq!(hours.days.len(), 6);
    assert_eq!(config.realtime.operator_buffer, 32);
    assert_eq!(config.operators[0].skills, vec![ChannelType::Whatsapp, ChannelType::Webchat]);

    let policy = config.routing_for(&TenantId::from("clinica-sorriso"));
    assert!(!policy.bot_enabled);
    assert!(policy.after_hours_to_human);
    assert_eq!(policy.sla_max_wait_secs, 60);
}

#[test]
fn unknown_key_gets_suggestion() {
    let toml = r#"
[routing]
idle_timout_mins = 10
"#;
    let errors = load_and_validate_str(toml).expect_err("typo must be rejected");
    let suggestion = errors.iter().find_map(|e| match e {
        ConfigError::UnknownKey { suggestion, .. } => suggestion.clone(),
        _ => None,
    });
    assert_eq!(suggestion.as_deref(), Some("idle_timeout_mins"));
}

#[test]
fn unknown_section_is_rejected() {
    let err = load_config_from_str("[telegram]\nbot_token = \"x\"\n").expect_err("unknown section");
    assert!(format!("{err}").contains("telegram"));
}

#[test]
fn wrong_type_is_reported() {
    let errors = load_and_validate_str("[server]\nport = \"eighty\"\n").expect_err("bad type");
    assert!(
        errors
            .iter()
            .any(|e| matches!(e, ConfigError::InvalidType { .. } | ConfigError::Other(_)))
    );
}

#[test]
fn unknown_skill_is_rejected() {
    let toml = r#"
[[operators]]
token = "op-token-0123456789"
tenant_id = "t"
operator_id = "o"
skills = ["telegram"]
"#;
    assert!(load_config_from_str(toml).is_err());
}

#[test]
fn env_overrides_file_values() {
    figment::Jail::expect_with(|jail| {
        jail.create_file(
            "custom.toml",
            r#"
[routing]
idle_timeout_mins = 10
"#,
        )?;
        jail.set_env("ATRIUM_ROUTING_IDLE_TIMEOUT_MINS", "45");
        jail.set_env("ATRIUM_SERVER_PORT", "7070");

        let config = load_config_from_path(std::path::Path::new("custom.toml"))
            .expect("config loads");
        assert_eq!(config.routing.idle_timeout_mins, 45);
        assert_eq!(config.server.port, 7070);
        Ok(())
    });
}
