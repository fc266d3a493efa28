use std::fs;

use assert_matches::assert_matches;
use camino::Utf8PathBuf;

use dsfetch::error::DatasetError;
use dsfetch::provider::Provider;
use dsfetch::settings::Settings;

#[test]
fn version_one_has_a_default_provider() {
    let settings = Settings::from_yaml(
        r#"
version: 1
provider:
  type: webdav
  url: https://datasets.example.org/dav
  auth:
    method: simple
    username: reader
    password: secret
path: /data/datasets
"#,
    )
    .unwrap();

    assert_eq!(settings.version(), 1);
    assert_eq!(settings.base().as_str(), "/data/datasets");
    let names = settings.providers().map(|(name, _)| name).collect::<Vec<_>>();
    assert_eq!(names, vec!["default"]);
    let provider = settings.provider("default").unwrap();
    assert_eq!(provider.provider_type, "webdav");
    assert!(provider.options.get("type").is_none());
    assert!(provider.options.get("url").is_some());
}

#[test]
fn version_one_accepts_type_shorthand() {
    let settings = Settings::from_yaml("version: 1\nprovider: local\npath: /tmp/x\n").unwrap();
    let provider = settings.provider("default").unwrap();
    assert_eq!(provider.provider_type, "local");
    assert!(provider.options.is_empty());
}

#[test]
fn version_two_keeps_file_order() {
    let settings = Settings::from_yaml(
        r#"
version: 2
providers:
  team:
    type: webdav
    url: https://datasets.example.org/dav
  mirror:
    type: local
    path: /mnt/datasets
    copy: true
  public:
    type: http
    url: https://example.org/EuroSAT.zip
    name: eurosat
path: /data/datasets
"#,
    )
    .unwrap();

    let names = settings.providers().map(|(name, _)| name).collect::<Vec<_>>();
    assert_eq!(names, vec!["team", "mirror", "public"]);
    assert_eq!(settings.provider("public").unwrap().provider_type, "http");
}

#[test]
fn malformed_settings_are_rejected() {
    let cases = [
        "provider: local\n",
        "version: 1\npath: /tmp\n",
        "version: 2\nprovider: local\n",
        "version: 2\nproviders: [local]\n",
        "version: 2\nproviders:\n  a:\n    url: x\n",
        "version: [",
    ];
    for case in cases {
        assert_matches!(
            Settings::from_yaml(case),
            Err(DatasetError::ConfigParse(_)),
            "{case}"
        );
    }
}

#[test]
fn missing_file_is_a_read_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("absent.yml");
    assert_matches!(Settings::read(&path), Err(DatasetError::ConfigRead(p)) if p == path);
}

#[test]
fn reads_file_and_builds_local_provider() {
    let dir = tempfile::tempdir().unwrap();
    let base = Utf8PathBuf::from_path_buf(dir.path().join("datasets")).unwrap();
    let path = dir.path().join("config.yml");
    fs::write(&path, format!("version: 1\nprovider: local\npath: {base}\n")).unwrap();

    let settings = Settings::read(&path).unwrap();
    let provider = settings.make_provider().unwrap();
    assert_matches!(&provider, Provider::Local(store) if store.root() == base);
}

#[test]
fn current_provider_is_selected_by_name() {
    let dir = tempfile::tempdir().unwrap();
    let base = Utf8PathBuf::from_path_buf(dir.path().join("cache")).unwrap();
    let mirror = Utf8PathBuf::from_path_buf(dir.path().join("mirror")).unwrap();
    let yaml = format!(
        "version: 2\nproviders:\n  plain:\n    type: local\n  copy:\n    type: local\n    path: {mirror}\n    copy: true\npath: {base}\n"
    );

    let settings = Settings::from_yaml(&yaml).unwrap();
    assert!(!settings.make_provider().unwrap().is_remote());

    let settings = settings.with_current(Some("copy".to_string()));
    assert_eq!(settings.current(), Some("copy"));
    let provider = settings.make_provider().unwrap();
    assert!(provider.is_remote());
    assert_eq!(provider.location(), mirror.as_str());

    let settings = settings.with_current(Some("nope".to_string()));
    assert_matches!(
        settings.make_provider(),
        Err(DatasetError::InvalidConfiguration(_))
    );
}

#[test]
fn first_buildable_provider_wins_without_default() {
    let dir = tempfile::tempdir().unwrap();
    let base = Utf8PathBuf::from_path_buf(dir.path().join("cache")).unwrap();
    let yaml = format!(
        "version: 2\nproviders:\n  broken:\n    type: webdav\n  fallback:\n    type: local\npath: {base}\n"
    );

    let provider = Settings::from_yaml(&yaml).unwrap().make_provider().unwrap();
    assert_matches!(&provider, Provider::Local(store) if store.root() == base);
}

#[test]
fn dataset_lookup_prefers_provider_offering_it() {
    let dir = tempfile::tempdir().unwrap();
    let base = Utf8PathBuf::from_path_buf(dir.path().join("cache")).unwrap();
    let shared = Utf8PathBuf::from_path_buf(dir.path().join("shared")).unwrap();
    fs::create_dir_all(shared.join("blink/1.0.0")).unwrap();
    let yaml = format!(
        "version: 2\nproviders:\n  own:\n    type: local\n  shared:\n    type: local\n    path: {shared}\npath: {base}\n"
    );
    let settings = Settings::from_yaml(&yaml).unwrap();

    let provider = settings.provider_for_dataset("blink").unwrap();
    assert_eq!(provider.location(), shared.as_str());

    let provider = settings.provider_for_dataset("unknown").unwrap();
    assert_eq!(provider.location(), base.as_str());
}
