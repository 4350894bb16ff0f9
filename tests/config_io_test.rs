use ekz_tesla::config::{Config, ConfigOverrides, ConfigStore, DEFAULT_BACKEND_URL};
use ekz_tesla::error::EkzError;
use tempfile::tempdir;

#[test]
fn save_then_load_keeps_values() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("nested").join("config.yaml");

    let mut cfg = Config::default();
    cfg.username = "ada@example.com".to_string();
    cfg.charging_station.box_id = "CH-1".to_string();
    cfg.charging_station.connector_id = 2;
    cfg.timezone = Some("Europe/Zurich".to_string());
    cfg.save_to_file(&path).unwrap();

    let (loaded, resolved) = Config::load(Some(&path)).unwrap();
    assert_eq!(resolved, path);
    assert_eq!(loaded, cfg);
}

#[test]
fn missing_file_yields_defaults() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("absent.yaml");

    let (cfg, resolved) = Config::load(Some(&path)).unwrap();
    assert_eq!(resolved, path);
    assert_eq!(cfg.backend_url, DEFAULT_BACKEND_URL);
    assert!(!path.exists());
}

#[test]
fn empty_file_yields_defaults() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("config.yaml");
    std::fs::write(&path, "  \n").unwrap();

    let (cfg, _) = Config::load(Some(&path)).unwrap();
    assert_eq!(cfg, Config::default());
}

#[test]
fn invalid_yaml_is_a_serialization_error() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("config.yaml");
    std::fs::write(&path, "charging_station: [not, a, map\n").unwrap();

    let err = Config::load(Some(&path)).unwrap_err();
    assert!(matches!(err, EkzError::Serialization { .. }), "{err}");
}

#[test]
fn overrides_do_not_reach_the_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("config.yaml");
    let on_disk = Config {
        username: "file@example.com".to_string(),
        ..Default::default()
    };
    on_disk.save_to_file(&path).unwrap();

    let mut effective = on_disk.clone();
    effective.apply_overrides(&ConfigOverrides {
        username: Some("flag@example.com".to_string()),
        password: Some("secret".to_string()),
        ..Default::default()
    });
    assert_eq!(effective.username, "flag@example.com");

    let store = ConfigStore::new(path.clone(), on_disk);
    store.persist_token("abc123").unwrap();

    let saved = Config::from_file(&path).unwrap();
    assert_eq!(saved.token, "abc123");
    assert_eq!(saved.username, "file@example.com");
    assert!(saved.password.is_empty());
}

#[test]
fn in_memory_store_writes_nothing() {
    let store = ConfigStore::in_memory();
    assert!(store.path().is_none());
    store.persist_token("abc123").unwrap();
}

#[test]
fn target_validation_names_the_missing_field() {
    let mut cfg = Config::default();
    let err = cfg.validate_target().unwrap_err();
    assert!(err.to_string().contains("box_id"));

    cfg.charging_station.box_id = "CH-1".to_string();
    let err = cfg.validate_target().unwrap_err();
    assert!(err.to_string().contains("connector_id"));

    cfg.charging_station.connector_id = 1;
    cfg.validate_target().unwrap();
    let err = cfg.validate_charging_station().unwrap_err();
    assert!(err.to_string().contains("latitude"));
}

#[test]
fn unknown_time_zone_is_rejected() {
    let cfg = Config {
        timezone: Some("Mars/Olympus".to_string()),
        ..Default::default()
    };
    assert!(matches!(
        cfg.time_zone().unwrap_err(),
        EkzError::Validation { .. }
    ));

    let cfg = Config {
        timezone: Some("Europe/Zurich".to_string()),
        ..Default::default()
    };
    assert_eq!(cfg.time_zone().unwrap(), Some(chrono_tz::Europe::Zurich));
}
