use std::fs;
use std::path::{Path, PathBuf};

use rstest::rstest;

use launchrc::resolve::{resolve_with, BaseEnvironment};
use launchrc::{Format, Manifest};

fn fixture(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(name)
}

#[rstest]
#[case("ecosystem.config.js")]
#[case("launch.toml")]
#[case("launch.yaml")]
fn test_every_format_resolves_the_same_invocation(#[case] file: &str) {
    let manifest = Manifest::load(fixture(file)).unwrap();
    assert_eq!(manifest.apps().len(), 1);

    let app = &manifest.apps()[0];
    let invocation = resolve_with(app, &BaseEnvironment::empty("/"));

    assert_eq!(invocation.app, "fastapi-chat");
    assert_eq!(
        invocation.command_line(),
        "python3 uvicorn backend.main:app --host 0.0.0.0 --port 8000"
    );
    assert_eq!(invocation.cwd, Path::new("/home/chat/chat-app"));
    assert_eq!(invocation.env.len(), 1);
    assert_eq!(invocation.env["PYTHONPATH"], ".");
    assert!(!app.watch());
}

#[test]
fn test_loading_twice_is_identical() {
    let path = fixture("ecosystem.profiles.js");
    assert_eq!(Manifest::load(&path).unwrap(), Manifest::load(&path).unwrap());
}

#[test]
fn test_profiles_select_deployment() {
    let path = fixture("ecosystem.profiles.js");
    let base = BaseEnvironment::empty("/");

    let prod = Manifest::load_profile(&path, None).unwrap();
    let prod = resolve_with(prod.get("fastapi-chat").unwrap(), &base);
    assert_eq!(prod.cwd, Path::new("/home/chat/chat-app"));
    assert!(!prod.env.contains_key("PYTHONUNBUFFERED"));

    let dev = Manifest::load_profile(&path, Some("dev")).unwrap();
    let app = dev.get("fastapi-chat").unwrap();
    assert!(app.watch());

    let dev = resolve_with(app, &base);
    assert_eq!(dev.cwd, Path::new("/home/chat/dev/chat-app"));
    assert_eq!(dev.args.last().map(String::as_str), Some("--reload"));
    assert_eq!(dev.env["PYTHONUNBUFFERED"], "1");
    assert_eq!(dev.env["PYTHONPATH"], ".");

    assert!(Manifest::load_profile(&path, Some("staging"))
        .unwrap_err()
        .is_validation());
}

#[rstest]
#[case(Format::Js, "apps.js")]
#[case(Format::Json, "apps.json")]
#[case(Format::Toml, "apps.toml")]
#[case(Format::Yaml, "apps.yaml")]
fn test_written_manifest_reloads_identically(#[case] format: Format, #[case] file: &str) {
    let original = Manifest::load(fixture("ecosystem.profiles.js")).unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join(file);
    fs::write(&path, original.render(format).unwrap()).unwrap();

    assert_eq!(Manifest::load(&path).unwrap(), original);
}

#[rstest]
#[case::missing_command(
    "apps.json",
    r#"{"apps": [{"name": "fastapi-chat", "interpreter": "python3"}]}"#
)]
#[case::duplicate_name(
    "apps.js",
    r#"module.exports = { apps: [{ name: "web", script: "uvicorn" }, { name: "web", script: "gunicorn" }] }"#
)]
#[case::bad_env_key(
    "apps.yaml",
    "apps:\n  - name: web\n    script: uvicorn\n    env:\n      PYTHON-PATH: .\n"
)]
fn test_invalid_manifest_files(#[case] file: &str, #[case] source: &str) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join(file);
    fs::write(&path, source).unwrap();

    let err = Manifest::load(&path).unwrap_err();
    assert!(err.is_validation(), "unexpected error: {}", err);
    assert!(err.app().is_some());
}

#[test]
fn test_malformed_file_is_a_parse_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ecosystem.config.js");
    fs::write(&path, "module.exports = { apps: [ { name: ").unwrap();

    assert!(Manifest::load(&path).unwrap_err().is_parse());
}

#[test]
fn test_missing_file() {
    let err = Manifest::load(fixture("does-not-exist.json")).unwrap_err();
    assert!(!err.is_parse());
    assert!(!err.is_validation());
}
