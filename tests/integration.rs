use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn bugnosis_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("bugnosis");
    path
}

fn setup_test_env(github_url: &str) -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let cache_dir = root.join("cache");
    fs::create_dir_all(&cache_dir).unwrap();

    let config_content = format!(
        r#"[search]
min_impact = 70
max_workers = 2

[cache]
dir = "{}"
ttl_secs = 600

[platforms.github]
api_url = "{}"
token_env = "BUGNOSIS_IT_UNSET_TOKEN"

[platforms.bugzilla.instances]
libreoffice = "https://bugs.documentfoundation.org"
"#,
        cache_dir.display(),
        github_url
    );

    let config_path = root.join("bugnosis.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_bugnosis(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = bugnosis_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .env_remove("BUGNOSIS_LOG")
        .env_remove("RUST_LOG")
        .output()
        .unwrap_or_else(|e| panic!("Failed to run bugnosis binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

fn mock_widgets_repo(server: &mut mockito::Server) -> (mockito::Mock, mockito::Mock) {
    let repo = server
        .mock("GET", "/repos/octo/widgets")
        .with_status(200)
        .with_body(r#"{"stargazers_count": 12000}"#)
        .create();
    let issues = server
        .mock("GET", "/repos/octo/widgets/issues")
        .match_query(mockito::Matcher::Any)
        .with_status(200)
        .with_body(
            r#"[
              {"number": 2, "title": "Panic on empty input", "html_url": "https://github.com/octo/widgets/issues/2",
               "state": "open", "comments": 60, "labels": [{"name": "good first issue"}]},
              {"number": 3, "title": "Typo in README", "html_url": "https://github.com/octo/widgets/issues/3",
               "state": "open", "comments": 0, "labels": []}
            ]"#,
        )
        .create();
    (repo, issues)
}

#[test]
fn test_platforms_lists_builtin_and_configured_instances() {
    let (_tmp, config) = setup_test_env("https://api.github.com");
    let (stdout, stderr, success) = run_bugnosis(&config, &["platforms"]);
    assert!(success, "platforms failed: {}", stderr);
    assert!(stdout.contains("github"));
    assert!(stdout.contains("gitlab"));
    assert!(stdout.contains("bugzilla-mozilla"));
    assert!(stdout.contains("bugzilla-libreoffice"));
    assert!(stdout.contains("Default Bugzilla instance: mozilla"));
}

#[test]
fn test_missing_config_uses_defaults() {
    let tmp = TempDir::new().unwrap();
    let (stdout, stderr, success) =
        run_bugnosis(&tmp.path().join("absent.toml"), &["platforms"]);
    assert!(success, "platforms failed: {}", stderr);
    assert!(stdout.contains("https://api.github.com"));
}

#[test]
fn test_invalid_config_is_rejected() {
    let tmp = TempDir::new().unwrap();
    let config = tmp.path().join("bugnosis.toml");
    fs::write(&config, "[search]\nmax_workers = 0\n").unwrap();
    let (_stdout, stderr, success) = run_bugnosis(&config, &["platforms"]);
    assert!(!success);
    assert!(stderr.contains("max_workers"));
}

#[test]
fn test_search_empty_query() {
    let (_tmp, config) = setup_test_env("https://api.github.com");
    let (stdout, _stderr, success) = run_bugnosis(&config, &["search", "  "]);
    assert!(success);
    assert!(stdout.contains("No results."));
}

#[test]
fn test_scan_unknown_platform_fails() {
    let (_tmp, config) = setup_test_env("https://api.github.com");
    let (_stdout, stderr, success) = run_bugnosis(&config, &["scan", "jira", "PROJ"]);
    assert!(!success);
    assert!(stderr.contains("Unknown platform: jira"));
    assert!(stderr.contains("github, gitlab, bugzilla"));
}

#[test]
fn test_scan_rejects_min_impact_above_100() {
    let (_tmp, config) = setup_test_env("http://127.0.0.1:9");
    let (stdout, stderr, success) =
        run_bugnosis(&config, &["scan", "github", "octo/widgets", "--min-impact", "150"]);
    assert!(!success);
    assert!(stdout.is_empty());
    assert!(stderr.contains("--min-impact must be in [0, 100]"));
}

#[test]
fn test_get_unknown_bugzilla_instance_fails() {
    let (_tmp, config) = setup_test_env("https://api.github.com");
    let (_stdout, stderr, success) = run_bugnosis(
        &config,
        &["get", "bugzilla", "Core", "1", "--instance", "nowhere"],
    );
    assert!(!success);
    assert!(stderr.contains("nowhere"));
}

#[test]
fn test_scan_github_ranks_and_filters() {
    let mut server = mockito::Server::new();
    let _mocks = mock_widgets_repo(&mut server);
    let (_tmp, config) = setup_test_env(&server.url());

    let (stdout, stderr, success) =
        run_bugnosis(&config, &["scan", "github", "octo/widgets", "--json"]);
    assert!(success, "scan failed: {}", stderr);

    let bugs: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    let bugs = bugs.as_array().unwrap();
    assert_eq!(bugs.len(), 1);
    assert_eq!(bugs[0]["issue_id"], 2);
    assert_eq!(bugs[0]["impact_score"], 97);
    assert_eq!(bugs[0]["platform"], "github");
}

#[test]
fn test_search_json_and_cache_clear() {
    let mut server = mockito::Server::new();
    let _mocks = mock_widgets_repo(&mut server);
    let (tmp, config) = setup_test_env(&server.url());

    let (stdout, stderr, success) =
        run_bugnosis(&config, &["search", "github:octo/widgets", "--json"]);
    assert!(success, "search failed: {}", stderr);
    let outcome: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(outcome["results"].as_array().unwrap().len(), 1);
    assert_eq!(outcome["per_platform_counts"]["github"], 1);
    assert!(outcome["failures"].as_array().unwrap().is_empty());

    let cached = fs::read_dir(tmp.path().join("cache")).unwrap().count();
    assert_eq!(cached, 2);

    let (stdout, stderr, success) = run_bugnosis(&config, &["cache", "clear"]);
    assert!(success, "cache clear failed: {}", stderr);
    assert!(stdout.contains("Cleared 2 cached responses"));
    assert_eq!(fs::read_dir(tmp.path().join("cache")).unwrap().count(), 0);
}
