use boxfuse::config::{BoxfuseConfig, CONFIG_ENV};
use boxfuse::error::FusionError;
use serial_test::serial;

#[test]
#[serial]
fn env_var_names_the_config_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("custom.toml");
    std::fs::write(&path, "[fusion]\nmatch_iou_threshold = 0.4\nweights = [1.0, 0.5]\n").unwrap();

    temp_env::with_var(CONFIG_ENV, Some(&path), || {
        let config = BoxfuseConfig::load(None).unwrap();
        assert_eq!(config.fusion.match_iou_threshold, 0.4);
        assert_eq!(config.fusion.weights(), Some(&[1.0, 0.5][..]));
        assert_eq!(BoxfuseConfig::resolve_path(None), Some(path.clone()));
    });
}

#[test]
#[serial]
fn explicit_path_beats_env_var() {
    let dir = tempfile::tempdir().unwrap();
    let from_env = dir.path().join("env.toml");
    let explicit = dir.path().join("explicit.toml");
    std::fs::write(&from_env, "[fusion]\nscore_threshold = 0.1\n").unwrap();
    std::fs::write(&explicit, "[fusion]\nscore_threshold = 0.2\n").unwrap();

    temp_env::with_var(CONFIG_ENV, Some(&from_env), || {
        let config = BoxfuseConfig::load(Some(&explicit)).unwrap();
        assert_eq!(config.fusion.score_threshold, 0.2);
    });
}

#[test]
#[serial]
fn env_var_pointing_nowhere_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("missing.toml");

    temp_env::with_var(CONFIG_ENV, Some(&missing), || {
        assert!(matches!(
            BoxfuseConfig::load(None),
            Err(FusionError::Io { .. })
        ));
    });
}

#[test]
#[serial]
fn absent_user_config_gives_defaults() {
    let dir = tempfile::tempdir().unwrap();

    temp_env::with_vars(
        [
            (CONFIG_ENV, None),
            ("XDG_CONFIG_HOME", Some(dir.path().as_os_str())),
        ],
        || {
            assert_eq!(BoxfuseConfig::load(None).unwrap(), BoxfuseConfig::default());
        },
    );
}

#[test]
#[serial]
fn empty_env_var_is_ignored() {
    let dir = tempfile::tempdir().unwrap();

    temp_env::with_vars(
        [
            (CONFIG_ENV, Some(std::ffi::OsStr::new(""))),
            ("XDG_CONFIG_HOME", Some(dir.path().as_os_str())),
        ],
        || {
            assert_eq!(BoxfuseConfig::load(None).unwrap(), BoxfuseConfig::default());
        },
    );
}
