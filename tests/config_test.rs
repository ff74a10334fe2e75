//! Integration tests for Settings loading from TOML files.
//!
//! Only `given_all_layers_when_loaded_then_later_layers_win` touches the
//! process environment; it points XDG_CONFIG_HOME at a temp directory and
//! removes every variable it sets before returning.

use std::env;
use std::fs;

use tempfile::TempDir;

use rollup::{ErrorKind, GroupNode, Settings, Value};

#[test]
fn given_config_file_when_loaded_then_overrides_defaults() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("rollup.toml");
    fs::write(&path, "unknown_label = \"n/a\"\n").unwrap();

    let settings = Settings::from_file(&path).expect("load settings");

    assert_eq!(settings.unknown_label, "n/a");
    assert!(settings.propagate_null, "unspecified keys keep defaults");
}

#[test]
fn given_config_file_with_all_keys_when_loaded_then_uses_all() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("rollup.toml");
    fs::write(&path, "unknown_label = \"?\"\npropagate_null = false\n").unwrap();

    let settings = Settings::from_file(&path).unwrap();

    assert_eq!(
        settings,
        Settings {
            unknown_label: "?".to_string(),
            propagate_null: false,
        }
    );
}

#[test]
fn given_missing_config_file_when_loaded_then_configuration_error() {
    let dir = TempDir::new().unwrap();
    let err = Settings::from_file(&dir.path().join("absent.toml")).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Configuration);
}

#[test]
fn given_empty_unknown_label_when_loaded_then_rejected() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("rollup.toml");
    fs::write(&path, "unknown_label = \"  \"\n").unwrap();

    let err = Settings::from_file(&path).unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Configuration);
    assert!(err.to_string().contains("unknown_label"));
}

#[test]
fn given_malformed_toml_when_loaded_then_configuration_error() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("rollup.toml");
    fs::write(&path, "unknown_label = [").unwrap();

    assert!(Settings::from_file(&path).is_err());
}

#[test]
fn given_template_written_when_loaded_then_matches_defaults() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("rollup.toml");
    fs::write(&path, Settings::template()).unwrap();

    let settings = Settings::from_file(&path).unwrap();

    assert_eq!(settings, Settings::default());
}

#[test]
fn given_loaded_settings_when_grouping_then_label_applies() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("rollup.toml");
    fs::write(&path, "unknown_label = \"unassigned\"\n").unwrap();
    let settings = Settings::from_file(&path).unwrap();

    let rows: Vec<std::collections::BTreeMap<String, Value>> = vec![
        [("team".to_string(), Value::from("core"))].into(),
        [("team".to_string(), Value::Null)].into(),
    ];
    let mut root = GroupNode::from_items(rows);
    root.group_by_with(&"team".parse().unwrap(), None, &settings)
        .unwrap();

    assert_eq!(
        root.child_names().unwrap(),
        vec![Some("core"), Some("unassigned")]
    );
}

#[test]
fn given_all_layers_when_loaded_then_later_layers_win() {
    let xdg = TempDir::new().unwrap();
    let global_dir = xdg.path().join("rollup");
    fs::create_dir_all(&global_dir).unwrap();
    fs::write(
        global_dir.join("rollup.toml"),
        "unknown_label = \"global\"\npropagate_null = true\n",
    )
    .unwrap();
    let local = TempDir::new().unwrap();
    let path = local.path().join("rollup.toml");
    fs::write(&path, "unknown_label = \"file\"\n").unwrap();
    env::set_var("XDG_CONFIG_HOME", xdg.path());

    let global_only = Settings::load(None);
    let with_file = Settings::load(Some(&path));
    env::set_var("ROLLUP_UNKNOWN_LABEL", "env");
    env::set_var("ROLLUP_PROPAGATE_NULL", "false");
    let with_env = Settings::load(Some(&path));

    env::remove_var("ROLLUP_UNKNOWN_LABEL");
    env::remove_var("ROLLUP_PROPAGATE_NULL");
    env::remove_var("XDG_CONFIG_HOME");

    assert_eq!(global_only.unwrap().unknown_label, "global");
    let with_file = with_file.unwrap();
    assert_eq!(with_file.unknown_label, "file");
    assert!(with_file.propagate_null);
    assert_eq!(
        with_env.unwrap(),
        Settings {
            unknown_label: "env".to_string(),
            propagate_null: false,
        }
    );
}
