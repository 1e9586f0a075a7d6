#![allow(clippy::unwrap_used)]
// Round-tripping profiles through an on-disk config file.

use std::time::Duration;

use pretty_assertions::assert_eq;

use sailor_config::{Config, ConfigError, Profile, load_config_from, save_config_to};
use sailor_core::TlsVerification;

#[test]
fn missing_file_yields_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = load_config_from(&dir.path().join("config.toml")).unwrap();
    assert_eq!(cfg.default_profile.as_deref(), Some("default"));
    assert_eq!(cfg.defaults.output, "table");
    assert_eq!(cfg.defaults.timeout, 30);
    assert!(cfg.defaults.live);
    assert!(cfg.profiles.is_empty());
}

#[test]
fn profiles_are_read_from_toml() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(
        &path,
        r#"
default_profile = "local"

[defaults]
timeout = 10
insecure = true

[profiles.local]
server = "http://localhost:1337"
auth_token = "abc"

[profiles.prod]
server = "https://api.example.com"
socket = "wss://events.example.com/socket"
timeout = 60
"#,
    )
    .unwrap();

    let cfg = load_config_from(&path).unwrap();
    assert_eq!(cfg.active_profile_name(None), "local");
    assert_eq!(cfg.profiles.len(), 2);

    let local = cfg.sailor_config("local").unwrap();
    assert_eq!(local.url.as_str(), "http://localhost:1337/");
    assert_eq!(local.timeout, Duration::from_secs(10));
    assert_eq!(local.tls, TlsVerification::DangerAcceptInvalid);
    assert_eq!(
        local.websocket_url.unwrap().as_str(),
        "ws://localhost:1337/"
    );

    let prod = cfg.sailor_config("prod").unwrap();
    assert_eq!(prod.timeout, Duration::from_secs(60));
    assert_eq!(
        prod.websocket_url.unwrap().as_str(),
        "wss://events.example.com/socket"
    );
}

#[test]
fn unknown_profile_is_reported_by_name() {
    let err = Config::default().sailor_config("nope").unwrap_err();
    assert!(matches!(err, ConfigError::ProfileNotFound { ref name } if name == "nope"));
}

#[test]
fn saved_config_loads_back() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("config.toml");

    let mut cfg = Config::default();
    cfg.profiles.insert(
        "home".into(),
        Profile {
            server: "http://nas.local:1337".into(),
            live: Some(false),
            max_reconnects: Some(3),
            ..Profile::default()
        },
    );
    save_config_to(&cfg, &path).unwrap();

    let loaded = load_config_from(&path).unwrap();
    let home = &loaded.profiles["home"];
    assert_eq!(home.server, "http://nas.local:1337");
    assert_eq!(home.live, Some(false));

    let runtime = loaded.sailor_config("home").unwrap();
    assert!(runtime.websocket_url.is_none());
    assert_eq!(runtime.reconnect.max_retries, Some(3));
}

#[test]
fn malformed_toml_is_a_loading_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "profiles = 7\n").unwrap();
    assert!(matches!(
        load_config_from(&path).unwrap_err(),
        ConfigError::Figment(_)
    ));
}
