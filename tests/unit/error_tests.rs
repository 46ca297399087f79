//! Display format and classification of `AppError`.

use notebook_fleet::AppError;

#[test]
fn display_carries_category_prefix() {
    let cases = [
        (AppError::Config("x".into()), "config: x"),
        (AppError::Provision("x".into()), "provision: x"),
        (AppError::Launch("x".into()), "launch: x"),
        (AppError::Registry("x".into()), "registry: x"),
        (AppError::Termination("x".into()), "termination: x"),
        (AppError::Io("x".into()), "io: x"),
    ];
    for (err, expected) in cases {
        assert_eq!(err.to_string(), expected);
    }
}

#[test]
fn only_config_and_registry_errors_abort_a_run() {
    assert!(AppError::Config("bad".into()).is_fatal());
    assert!(AppError::Registry("disk full".into()).is_fatal());
    assert!(!AppError::Provision("template missing".into()).is_fatal());
    assert!(!AppError::Launch("spawn failed".into()).is_fatal());
    assert!(!AppError::Termination("EPERM".into()).is_fatal());
}

#[test]
fn toml_errors_become_config_errors() {
    let toml_err = toml::from_str::<toml::Value>("= nope").expect_err("invalid toml");
    let err = AppError::from(toml_err);
    assert!(matches!(err, AppError::Config(_)));
    assert!(err.to_string().starts_with("config: invalid config"));
}

#[test]
fn implements_std_error() {
    fn assert_error<E: std::error::Error>(_: &E) {}
    let err = AppError::Launch("spawn failed".into());
    assert_error(&err);
    assert!(format!("{err:?}").contains("Launch"));
}
