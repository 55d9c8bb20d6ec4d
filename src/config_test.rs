use std::collections::HashMap;

use super::*;

fn config_from(pairs: &[(&str, &str)]) -> Result<HostConfig, ConfigError> {
    let vars: HashMap<String, String> = pairs.iter().map(|(k, v)| ((*k).to_owned(), (*v).to_owned())).collect();
    HostConfig::from_lookup(|key| vars.get(key).cloned())
}

const REQUIRED: [(&str, &str); 4] = [
    ("DATABASE_URL", "postgres://localhost/roomchat"),
    ("CHAT_ROOM_ID", "R1"),
    ("CHAT_USER_ID", "U1"),
    ("CHAT_OWNER_ID", "U2"),
];

#[test]
fn required_only_uses_defaults() {
    let cfg = config_from(&REQUIRED).unwrap();
    assert_eq!(cfg.database_url, "postgres://localhost/roomchat");
    assert_eq!(cfg.props, PanelProps { owner_id: "U2".into(), room_id: "R1".into(), user_id: "U1".into() });
    assert_eq!(cfg.db_max_connections, DEFAULT_DB_MAX_CONNECTIONS);
    assert_eq!(cfg.options, PanelOptions::default());
    assert_eq!(cfg.terminal_width, DEFAULT_TERMINAL_WIDTH);
}

#[test]
fn optional_overrides_are_parsed() {
    let mut pairs = REQUIRED.to_vec();
    pairs.extend([("DB_MAX_CONNECTIONS", "2"), ("CHAT_SCROLL_DURATION_MS", " 350 "), ("CHAT_WIDTH", "120")]);
    let cfg = config_from(&pairs).unwrap();
    assert_eq!(cfg.db_max_connections, 2);
    assert_eq!(cfg.options.scroll_duration, Duration::from_millis(350));
    assert_eq!(cfg.terminal_width, 120);
}

#[test]
fn missing_room_errors() {
    let pairs: Vec<_> = REQUIRED.iter().copied().filter(|(k, _)| *k != "CHAT_ROOM_ID").collect();
    assert_eq!(config_from(&pairs).unwrap_err(), ConfigError::Missing { var: "CHAT_ROOM_ID" });
}

#[test]
fn blank_required_value_counts_as_missing() {
    let mut pairs = REQUIRED.to_vec();
    pairs[0] = ("DATABASE_URL", "   ");
    assert_eq!(config_from(&pairs).unwrap_err(), ConfigError::Missing { var: "DATABASE_URL" });
}

#[test]
fn invalid_number_errors_with_value() {
    let mut pairs = REQUIRED.to_vec();
    pairs.push(("CHAT_WIDTH", "wide"));
    let err = config_from(&pairs).unwrap_err();
    assert_eq!(err, ConfigError::Invalid { var: "CHAT_WIDTH", value: "wide".into() });
    assert_eq!(err.to_string(), "invalid value for CHAT_WIDTH: wide");
}
