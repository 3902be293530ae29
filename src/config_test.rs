use super::*;

#[test]
fn defaults_match_documented_constants() {
    let config = SessionConfig::default();
    assert_eq!(config.reconnect_attempts, 5);
    assert_eq!(config.reconnect_delay, Duration::from_millis(3000));
    assert_eq!(config.max_message_length, 500);
    assert_eq!(config.message_history_limit, 100);
}

#[test]
fn env_parse_falls_back_on_missing_or_garbage() {
    assert_eq!(env_parse("QUARTET_TEST_SURELY_UNSET_KEY", 7_u32), 7);
}

#[test]
fn deployment_parse_is_case_insensitive() {
    assert_eq!(Deployment::parse("production"), Deployment::Production);
    assert_eq!(Deployment::parse(" PRODUCTION "), Deployment::Production);
    assert_eq!(Deployment::parse("development"), Deployment::Development);
    assert_eq!(Deployment::parse(""), Deployment::Development);
}

#[test]
fn resolve_derives_ws_scheme_from_api_url() {
    let endpoint = Endpoint::resolve(None, "http://localhost:8080", Deployment::Development).expect("resolve");
    assert_eq!(endpoint.base(), "ws://localhost:8080");

    let endpoint = Endpoint::resolve(None, "https://chat.example.test", Deployment::Development).expect("resolve");
    assert_eq!(endpoint.base(), "wss://chat.example.test");
}

#[test]
fn resolve_upgrades_to_secure_scheme_in_production() {
    let endpoint = Endpoint::resolve(None, "http://chat.example.test", Deployment::Production).expect("resolve");
    assert_eq!(endpoint.base(), "wss://chat.example.test");

    let endpoint =
        Endpoint::resolve(Some("ws://edge.example.test"), "http://ignored", Deployment::Production).expect("resolve");
    assert_eq!(endpoint.base(), "wss://edge.example.test");
}

#[test]
fn resolve_prefers_explicit_ws_url() {
    let endpoint =
        Endpoint::resolve(Some("ws://127.0.0.1:9000"), "http://localhost:8080", Deployment::Development).expect("resolve");
    assert_eq!(endpoint.base(), "ws://127.0.0.1:9000");
}

#[test]
fn resolve_rejects_unknown_or_missing_scheme() {
    let err = Endpoint::resolve(None, "ftp://host", Deployment::Development).expect_err("ftp");
    assert!(matches!(err, ConfigError::UnsupportedScheme { ref scheme, .. } if scheme == "ftp"));

    let err = Endpoint::resolve(None, "localhost:8080", Deployment::Development).expect_err("no scheme");
    assert!(matches!(err, ConfigError::InvalidUrl { .. }));
}

#[test]
fn url_for_appends_path_and_encoded_identity() {
    let endpoint = Endpoint::new("ws://localhost:8080/");
    let url = endpoint.url_for("alice").expect("url");
    assert_eq!(url, "ws://localhost:8080/ws?username=alice");

    let url = endpoint.url_for("a b&c=d").expect("url");
    assert_eq!(url, "ws://localhost:8080/ws?username=a+b%26c%3Dd");
}

#[test]
fn url_for_rejects_non_ws_base() {
    let err = Endpoint::new("http://localhost:8080").url_for("alice").expect_err("http base");
    assert!(matches!(err, ConfigError::UnsupportedScheme { .. }));

    let err = Endpoint::new("not a url").url_for("alice").expect_err("garbage base");
    assert!(matches!(err, ConfigError::InvalidUrl { .. }));
}
