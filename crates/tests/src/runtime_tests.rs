//! A runtime built from a config file, with models and resources on disk.

use kiln_core::{
    cache::CacheStatus,
    config::AppConfig,
    manager::ManagerError,
    runtime::{KilnRuntime, RuntimeError},
};
use std::path::Path;
use tempfile::TempDir;

const GROUPS: &str = r#"
[[groups]]
name = "site"
resources = [
    { kind = "style", uri = "css/reset.css" },
    { kind = "style", uri = "css/theme.css" },
    { kind = "script", uri = "js/app.js" },
]
"#;

/// Lays out a config file, a groups file and a resource tree in a fresh directory.
fn site_dir(policy: &str) -> TempDir {
    let dir = tempfile::tempdir().expect("tempdir");
    let root = dir.path();
    std::fs::create_dir_all(root.join("web/css")).expect("css dir");
    std::fs::create_dir_all(root.join("web/js")).expect("js dir");
    std::fs::write(root.join("web/css/reset.css"), "* {\n  margin: 0;\n}\n").expect("reset");
    std::fs::write(root.join("web/css/theme.css"), "/* brand */\nh1 { color: ${brand}; }\n")
        .expect("theme");
    std::fs::write(root.join("web/js/app.js"), "boot()\n").expect("app");
    std::fs::write(root.join("groups.toml"), GROUPS).expect("groups");

    let config = format!(
        r#"
[server]
bind_address = "127.0.0.1"
bind_port = 8080
mount_prefix = "assets"

[pipeline]
model_update_period_seconds = 300
content_update_period_seconds = 300
on_processor_error = "{policy}"
evict_on_error = false

[resources]
model_path = "{model}"
root_dir = "{root}"

[resources.variables]
brand = "tomato"

[metrics]
enabled = false

[logging]
level = "debug"
format = "pretty"
"#,
        model = root.join("groups.toml").display(),
        root = root.join("web").display(),
    );
    std::fs::write(root.join("config.toml"), config).expect("config");
    dir
}

fn load_config(dir: &Path) -> AppConfig {
    AppConfig::from_file(dir.join("config.toml")).expect("config parses")
}

#[tokio::test]
async fn test_runtime_serves_groups_from_disk() {
    let dir = site_dir("fail-fast");
    let config = load_config(dir.path());
    assert_eq!(config.resources.variables["brand"], "tomato");

    let runtime = KilnRuntime::builder().with_config(config).preload_model().await.expect("runtime");
    assert!(runtime.components().metrics_collector().is_none());

    let css = runtime.process_path("/assets/site.css", None).await.expect("css");
    assert_eq!(&css.content[..], b"* {\nmargin: 0;\n}\nh1 { color: tomato; }");
    assert_eq!(css.status, CacheStatus::Miss);

    let js = runtime.process_path("/assets/site.js", Some("minimize=false")).await.expect("js");
    assert_eq!(&js.content[..], b"boot();\n");

    let again = runtime.process_path("/assets/site.css", None).await.expect("cached");
    assert_eq!(again.status, CacheStatus::Hit);
    assert_eq!(runtime.model_provider().load_count(), 1);

    runtime.shutdown().await;
}

#[tokio::test]
async fn test_flags_pick_up_changes_on_disk() {
    let dir = site_dir("fail-fast");
    let runtime = KilnRuntime::builder()
        .with_config(load_config(dir.path()))
        .preload_model()
        .await
        .expect("runtime");

    runtime.process_path("site.js", None).await.expect("first");
    std::fs::write(dir.path().join("web/js/app.js"), "boot(2)").expect("rewrite");

    let cached = runtime.process_path("site.js", None).await.expect("cached");
    assert_eq!(&cached.content[..], b"boot();");

    runtime.components().scheduler().content_flag().raise();
    let fresh = runtime.process_path("site.js", None).await.expect("fresh");
    assert_eq!(&fresh.content[..], b"boot(2);");

    std::fs::write(
        dir.path().join("groups.toml"),
        format!("{GROUPS}\n[[groups]]\nname = \"extra\"\nresources = [{{ kind = \"script\", uri = \"js/app.js\" }}]\n"),
    )
    .expect("rewrite groups");
    assert!(matches!(
        runtime.process_path("extra.js", None).await,
        Err(ManagerError::UnknownGroup(_))
    ));

    runtime.components().scheduler().model_flag().raise();
    let extra = runtime.process_path("extra.js", None).await.expect("extra group");
    assert_eq!(&extra.content[..], b"boot(2);");
    assert_eq!(runtime.model_provider().snapshot().expect("model").len(), 2);

    runtime.shutdown().await;
}

#[tokio::test]
async fn test_skip_policy_from_config() {
    let dir = site_dir("skip-and-continue");
    std::fs::remove_file(dir.path().join("web/css/theme.css")).expect("remove theme");

    let runtime = KilnRuntime::builder()
        .with_config(load_config(dir.path()))
        .disable_scheduler()
        .preload_model()
        .await
        .expect("runtime");

    let css = runtime.process_path("site.css", None).await.expect("skips missing file");
    assert_eq!(&css.content[..], b"* {\nmargin: 0;\n}");
    runtime.shutdown().await;
}

#[tokio::test]
async fn test_shutdown_is_idempotent() {
    let dir = site_dir("fail-fast");
    let runtime = KilnRuntime::builder().with_config(load_config(dir.path())).build().expect("runtime");
    assert!(runtime.components().scheduler().is_running());

    runtime.shutdown().await;
    runtime.shutdown().await;

    assert!(runtime.is_shutdown());
    assert!(!runtime.components().scheduler().is_running());
    // Requests are still answered; only the timers are gone.
    runtime.process_path("site.js", None).await.expect("served after shutdown");
}

#[tokio::test]
async fn test_preload_rejects_malformed_model() {
    let dir = site_dir("fail-fast");
    std::fs::write(
        dir.path().join("groups.toml"),
        "[[groups]]\nname = \"a\"\n\n[[groups]]\nname = \"a\"\n",
    )
    .expect("duplicate groups");

    let err = KilnRuntime::builder()
        .with_config(load_config(dir.path()))
        .preload_model()
        .await
        .expect_err("duplicate group names");

    match err {
        RuntimeError::ModelLoad(message) => assert!(message.contains("duplicate group name")),
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_invalid_config_is_rejected() {
    let dir = site_dir("fail-fast");
    let mut config = load_config(dir.path());
    config.server.mount_prefix = "a/b".to_string();

    let err = KilnRuntime::builder().with_config(config).build().expect_err("invalid prefix");
    assert!(matches!(err, RuntimeError::ConfigValidation(_)));
}

#[tokio::test]
async fn test_bundled_sample_site_renders() {
    let workspace = Path::new(env!("CARGO_MANIFEST_DIR")).join("../..");
    let mut config = AppConfig::from_file(workspace.join("config/config.toml")).expect("sample config");
    config.resources.model_path = workspace.join("config/groups.toml").display().to_string();
    config.resources.root_dir = workspace.join("public").display().to_string();
    config.metrics.enabled = false;

    let runtime = KilnRuntime::builder()
        .with_config(config)
        .disable_scheduler()
        .preload_model()
        .await
        .expect("sample model loads");

    let css = runtime.process_path("/assets/site.css", None).await.expect("site styles");
    let css = String::from_utf8(css.content.to_vec()).expect("utf-8");
    assert!(css.contains("color: #336699;"));
    assert!(!css.contains("/*"));

    let admin = runtime.process_path("/assets/admin.js", None).await.expect("admin scripts");
    let admin = String::from_utf8(admin.content.to_vec()).expect("utf-8");
    assert!(admin.ends_with("window.admin = { enabled: true };"));
}
