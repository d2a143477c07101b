//! Loading configuration from files and the environment.

use std::io::Write;

use keystone::ConfigError;
use keystone::KeystoneConfig;
use keystone::config::ENV_ALLOW_MANUAL_PREFIXES;
use keystone::config::ENV_CONTENT_PREFIX;
use keystone::config::ENV_MAX_RETRY_ATTEMPTS;
use keystone::config::ENV_NODE_PREFIX;

fn write_config(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

#[test]
fn test_from_toml_file() {
    let file = write_config(
        r#"
[directory]
node_prefix = "02fe"
content_prefix = "02"
allow_manual_prefixes = true

[retry]
max_attempts = 12
initial_backoff_ms = 2
max_backoff_ms = 64
"#,
    );

    let config = KeystoneConfig::from_toml_file(file.path()).unwrap();
    assert_eq!(config.directory.node_prefix_bytes().unwrap(), vec![0x02, 0xFE]);
    assert_eq!(config.directory.content_prefix_bytes().unwrap(), vec![0x02]);
    assert!(config.directory.allow_manual_prefixes);

    let retry = config.retry_policy();
    assert_eq!(retry.max_attempts, 12);
    assert_eq!(retry.initial_backoff_ms, 2);
    assert_eq!(retry.max_backoff_ms, 64);
}

#[test]
fn test_missing_file_is_a_read_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = KeystoneConfig::from_toml_file(dir.path().join("absent.toml")).unwrap_err();
    assert!(matches!(err, ConfigError::ReadFile { .. }), "{err}");
}

#[test]
fn test_malformed_file_is_a_parse_error() {
    let file = write_config("[directory\nnode_prefix = ");
    let err = KeystoneConfig::from_toml_file(file.path()).unwrap_err();
    assert!(matches!(err, ConfigError::Parse { .. }), "{err}");
}

#[test]
fn test_unknown_type_is_a_parse_error() {
    let file = write_config("[retry]\nmax_attempts = \"many\"\n");
    assert!(matches!(
        KeystoneConfig::from_toml_file(file.path()),
        Err(ConfigError::Parse { .. })
    ));
}

// Every environment variable is exercised in this one test so that no other
// test in this binary observes them.
#[test]
fn test_environment_overrides_file_values() {
    let file = write_config("[directory]\nnode_prefix = \"03fe\"\ncontent_prefix = \"03\"\n");

    // SAFETY: no other test in this binary reads or writes the environment.
    unsafe {
        std::env::set_var(ENV_NODE_PREFIX, "04fe");
        std::env::set_var(ENV_CONTENT_PREFIX, "04");
        std::env::set_var(ENV_ALLOW_MANUAL_PREFIXES, "true");
        std::env::set_var(ENV_MAX_RETRY_ATTEMPTS, "5");
    }

    let layered = KeystoneConfig::load_with_layers(Some(file.path())).unwrap();
    assert_eq!(layered.directory.node_prefix, "04fe");
    assert_eq!(layered.directory.content_prefix, "04");
    assert!(layered.directory.allow_manual_prefixes);
    assert_eq!(layered.retry.max_attempts, 5);

    let loaded = KeystoneConfig::load().unwrap();
    assert_eq!(loaded, layered);

    // SAFETY: as above.
    unsafe {
        std::env::set_var(ENV_MAX_RETRY_ATTEMPTS, "lots");
    }
    let err = KeystoneConfig::load().unwrap_err();
    assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == ENV_MAX_RETRY_ATTEMPTS));

    // SAFETY: as above.
    unsafe {
        std::env::set_var(ENV_MAX_RETRY_ATTEMPTS, "5");
        std::env::set_var(ENV_NODE_PREFIX, "not-hex");
    }
    let err = KeystoneConfig::load().unwrap_err();
    assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == ENV_NODE_PREFIX));

    // SAFETY: as above.
    unsafe {
        std::env::remove_var(ENV_NODE_PREFIX);
        std::env::remove_var(ENV_CONTENT_PREFIX);
        std::env::remove_var(ENV_ALLOW_MANUAL_PREFIXES);
        std::env::remove_var(ENV_MAX_RETRY_ATTEMPTS);
    }
    let defaults = KeystoneConfig::load_with_layers(None).unwrap();
    assert_eq!(defaults, KeystoneConfig::default());
}
