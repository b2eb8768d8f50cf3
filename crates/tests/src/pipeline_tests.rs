//! Request flow through the manager: resolution, processing, caching and model reloads.

use crate::mock_infrastructure::{model, Harness, HarnessOptions, MockModelLoader, MockResourceReader};
use kiln_core::{
    cache::{CacheStatus, ContentCacheConfig, ContentCache},
    manager::{GroupRequest, ManagerError, RequestManager},
    metrics::NoopSink,
    model::{FileModelLoader, ModelError, ModelProvider, ResourceKind, ResourceRef},
    processor::{ErrorPolicy, ProcessorChain, READER_UNIT},
    resource::FsResourceReader,
    scheduler::StalenessFlag,
};
use std::{collections::BTreeMap, sync::Arc};
use tokio::time::Duration;

fn site_reader() -> MockResourceReader {
    MockResourceReader::new()
        .with("reset.css", "html { margin: 0; }\n")
        .with("theme.css", "/* theme */\na {\n  color: ${brand};\n}\n")
        .with("app.js", "run()\n")
        .with("lib.js", "init();")
}

fn site_model() -> kiln_core::model::ResourceModel {
    model(vec![(
        "site",
        vec![
            ResourceRef::style("reset.css"),
            ResourceRef::script("app.js"),
            ResourceRef::style("theme.css"),
            ResourceRef::script("lib.js"),
        ],
    )])
}

fn standard_chain(policy: ErrorPolicy) -> ProcessorChain {
    ProcessorChain::standard(BTreeMap::from([("brand".to_string(), "#336699".to_string())]), policy)
}

fn text(content: &bytes::Bytes) -> &str {
    std::str::from_utf8(content).expect("utf-8 output")
}

#[tokio::test]
async fn test_identity_chain_concatenates_in_declared_order() {
    let harness = Harness::new(site_model(), site_reader(), HarnessOptions::default());

    let all = harness.manager.process(&GroupRequest::new("site", None, false)).await.expect("whole group");
    assert_eq!(
        text(&all.content),
        "html { margin: 0; }\nrun()\n/* theme */\na {\n  color: ${brand};\n}\ninit();"
    );
    assert_eq!(all.content_type(), "text/plain; charset=utf-8");

    let styles = harness
        .manager
        .process(&GroupRequest::new("site", Some(ResourceKind::Style), false))
        .await
        .expect("styles");
    assert_eq!(text(&styles.content), "html { margin: 0; }\n/* theme */\na {\n  color: ${brand};\n}\n");
    assert_eq!(styles.content_type(), "text/css; charset=utf-8");
}

#[tokio::test]
async fn test_declared_order_decides_output() {
    let reader = MockResourceReader::new().with("a.css", "a {}\n").with("b.css", "b {}\n");
    let harness = Harness::new(
        model(vec![
            ("ab", vec![ResourceRef::style("a.css"), ResourceRef::style("b.css")]),
            ("ba", vec![ResourceRef::style("b.css"), ResourceRef::style("a.css")]),
        ]),
        reader,
        HarnessOptions::default(),
    );

    let ab = harness.manager.process(&GroupRequest::new("ab", None, false)).await.expect("ab");
    let ba = harness.manager.process(&GroupRequest::new("ba", None, false)).await.expect("ba");
    assert_eq!(text(&ab.content), "a {}\nb {}\n");
    assert_eq!(text(&ba.content), "b {}\na {}\n");

    let again = harness.manager.process(&GroupRequest::new("ab", None, false)).await.expect("ab again");
    assert_eq!(again.content, ab.content);
    assert_eq!(again.status, CacheStatus::Hit);
    assert_eq!(harness.reader.read_count("a.css"), 2);
}

#[tokio::test]
async fn test_standard_chain_minimizes_styles() {
    let harness = Harness::new(
        site_model(),
        site_reader(),
        HarnessOptions { chain: standard_chain(ErrorPolicy::FailFast), ..Default::default() },
    );

    let css = harness
        .manager
        .process(&GroupRequest::new("site", Some(ResourceKind::Style), true))
        .await
        .expect("styles");
    assert_eq!(text(&css.content), "html { margin: 0; }\na {\ncolor: #336699;\n}");
}

#[tokio::test]
async fn test_standard_chain_terminates_scripts() {
    let harness = Harness::new(
        site_model(),
        site_reader(),
        HarnessOptions { chain: standard_chain(ErrorPolicy::FailFast), ..Default::default() },
    );

    let minimized = harness
        .manager
        .process(&GroupRequest::new("site", Some(ResourceKind::Script), true))
        .await
        .expect("minimized scripts");
    assert_eq!(text(&minimized.content), "run();\ninit();");

    let readable = harness
        .manager
        .process(&GroupRequest::new("site", Some(ResourceKind::Script), false))
        .await
        .expect("readable scripts");
    assert_eq!(text(&readable.content), "run();\ninit();\n");
}

#[tokio::test]
async fn test_standard_chain_minimizes_whole_group() {
    let reader = MockResourceReader::new()
        .with("reset.css", "html { margin: 0; }\n")
        .with("theme.css", "/* theme */\na {\n  color: ${brand};\n}\n")
        .with("app.js", "const msg = `hello ${user}`")
        .with("lib.js", "init();");
    let harness = Harness::new(
        site_model(),
        reader,
        HarnessOptions { chain: standard_chain(ErrorPolicy::FailFast), ..Default::default() },
    );

    let all = harness.manager.process(&GroupRequest::new("site", None, true)).await.expect("whole group");
    assert_eq!(
        text(&all.content),
        "html { margin: 0; }\nconst msg = `hello ${user}`;\na {\ncolor: #336699;\n}\ninit();"
    );
}

#[tokio::test]
async fn test_minimize_flag_selects_distinct_entries() {
    let harness = Harness::new(site_model(), site_reader(), HarnessOptions::default());

    let on = harness.manager.process(&GroupRequest::new("site", None, true)).await.expect("on");
    let off = harness.manager.process(&GroupRequest::new("site", None, false)).await.expect("off");

    assert_eq!(on.status, CacheStatus::Miss);
    assert_eq!(off.status, CacheStatus::Miss);
    assert_eq!(harness.cache.len(), 2);
}

#[tokio::test]
async fn test_fail_fast_surfaces_missing_resource() {
    let reader = site_reader();
    reader.remove("theme.css");
    let harness = Harness::new(site_model(), reader, HarnessOptions::default());

    let err = harness
        .manager
        .process(&GroupRequest::new("site", Some(ResourceKind::Style), false))
        .await
        .expect_err("missing resource");

    match err {
        ManagerError::ProcessingFailed(failure) => {
            assert_eq!(failure.unit, READER_UNIT);
            assert_eq!(failure.resource.as_deref(), Some("style:theme.css"));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(harness.sink.counts().errors, 1);
    assert!(harness.cache.is_empty());
}

#[tokio::test]
async fn test_skip_and_continue_drops_missing_resource() {
    let reader = site_reader();
    reader.remove("theme.css");
    let chain = ProcessorChain::builder().policy(ErrorPolicy::SkipAndContinue).build();
    let harness = Harness::new(site_model(), reader, HarnessOptions { chain, ..Default::default() });

    let css = harness
        .manager
        .process(&GroupRequest::new("site", Some(ResourceKind::Style), false))
        .await
        .expect("skips the unreadable resource");
    assert_eq!(text(&css.content), "html { margin: 0; }\n");
}

#[tokio::test]
async fn test_step_failure_under_each_policy() {
    let reader = MockResourceReader::new().with("a.css", "a { color: ${undefined}; }");
    let groups = || model(vec![("g1", vec![ResourceRef::style("a.css")])]);
    let request = GroupRequest::new("g1", Some(ResourceKind::Style), false);

    let strict = Harness::new(
        groups(),
        reader,
        HarnessOptions { chain: standard_chain(ErrorPolicy::FailFast), ..Default::default() },
    );
    match strict.manager.process(&request).await {
        Err(ManagerError::ProcessingFailed(failure)) => {
            assert_eq!(failure.unit, "variable-substitution");
            assert!(failure.cause.contains("undefined"));
        }
        other => panic!("expected a processing failure, got {other:?}"),
    }

    let lenient = Harness::new(
        groups(),
        MockResourceReader::new().with("a.css", "a { color: ${undefined}; }"),
        HarnessOptions { chain: standard_chain(ErrorPolicy::SkipAndContinue), ..Default::default() },
    );
    let css = lenient.manager.process(&request).await.expect("passes content through");
    assert_eq!(text(&css.content), "a { color: ${undefined}; }");
}

#[tokio::test]
async fn test_unknown_group_is_not_cached() {
    let harness = Harness::new(site_model(), site_reader(), HarnessOptions::default());

    for _ in 0..2 {
        let err = harness.manager.process(&GroupRequest::new("nope", None, true)).await.unwrap_err();
        assert!(matches!(err, ManagerError::UnknownGroup(ref name) if name == "nope"));
        assert!(err.is_client_error());
    }
    assert!(harness.cache.is_empty());
    assert_eq!(harness.sink.counts().misses, 0);
}

#[tokio::test]
async fn test_failed_recomputation_retains_previous_entry() {
    let harness = Harness::new(site_model(), site_reader(), HarnessOptions::default());
    let request = GroupRequest::new("site", Some(ResourceKind::Style), false);
    let key = request.cache_key();

    let first = harness.manager.process(&request).await.expect("first");
    harness.reader.remove("reset.css");
    harness.content_flag.raise();

    assert!(harness.manager.process(&request).await.is_err());

    let retained = harness.cache.entry(&key).expect("entry retained");
    assert_eq!(retained.content, first.content);
    assert!(harness.cache.get(&key).is_none(), "retained entry is stale");
}

#[tokio::test]
async fn test_failed_recomputation_evicts_when_configured() {
    let harness = Harness::new(
        site_model(),
        site_reader(),
        HarnessOptions { evict_on_error: true, ..Default::default() },
    );
    let request = GroupRequest::new("site", Some(ResourceKind::Style), false);

    harness.manager.process(&request).await.expect("first");
    harness.reader.remove("reset.css");
    harness.content_flag.raise();

    assert!(harness.manager.process(&request).await.is_err());
    assert!(harness.cache.entry(&request.cache_key()).is_none());
}

#[tokio::test]
async fn test_zero_content_period_recomputes_every_request() {
    let harness = Harness::new(
        site_model(),
        site_reader(),
        HarnessOptions { content_update_period: Duration::ZERO, ..Default::default() },
    );
    let request = GroupRequest::new("site", Some(ResourceKind::Script), false);

    for _ in 0..3 {
        let read = harness.manager.process(&request).await.expect("recomputed");
        assert_eq!(read.status, CacheStatus::Miss);
    }
    assert_eq!(harness.reader.read_count("app.js"), 3);
    assert_eq!(harness.loader.load_count(), 1);
}

#[tokio::test]
async fn test_model_flag_reloads_model() {
    let harness = Harness::new(site_model(), site_reader(), HarnessOptions::default());
    harness.manager.process(&GroupRequest::new("site", None, true)).await.expect("site");

    harness.loader.set_model(model(vec![("extra", vec![ResourceRef::script("lib.js")])]));
    let err = harness.manager.process(&GroupRequest::new("extra", None, true)).await.unwrap_err();
    assert!(matches!(err, ManagerError::UnknownGroup(_)), "fresh model is not reloaded");

    harness.model_flag.raise();
    let extra = harness.manager.process(&GroupRequest::new("extra", None, false)).await.expect("reloaded");
    assert_eq!(text(&extra.content), "init();");
    assert_eq!(harness.loader.load_count(), 2);
    assert!(!harness.model_flag.is_raised());
    assert_eq!(harness.sink.counts().model_refreshed, 2);
}

#[tokio::test]
async fn test_removed_group_is_not_served_from_cache() {
    let harness = Harness::new(site_model(), site_reader(), HarnessOptions::default());
    let request = GroupRequest::new("site", Some(ResourceKind::Script), false);
    assert_eq!(harness.manager.process(&request).await.expect("first").status, CacheStatus::Miss);
    assert_eq!(harness.manager.process(&request).await.expect("cached").status, CacheStatus::Hit);

    harness.loader.set_model(model(vec![("extra", vec![ResourceRef::script("lib.js")])]));
    harness.model_flag.raise();

    let err = harness.manager.process(&request).await.unwrap_err();
    assert!(matches!(err, ManagerError::UnknownGroup(ref name) if name == "site"));
    assert!(harness.cache.get(&request.cache_key()).is_none());
    assert_eq!(harness.cache.epoch(), 1);
}

#[tokio::test]
async fn test_reordered_group_is_recomputed() {
    let harness = Harness::new(site_model(), site_reader(), HarnessOptions::default());
    let request = GroupRequest::new("site", Some(ResourceKind::Script), false);
    let first = harness.manager.process(&request).await.expect("first");
    assert_eq!(text(&first.content), "run()\ninit();");

    harness
        .loader
        .set_model(model(vec![("site", vec![ResourceRef::script("lib.js"), ResourceRef::script("app.js")])]));
    harness.model_flag.raise();

    let reordered = harness.manager.process(&request).await.expect("reordered");
    assert_eq!(reordered.status, CacheStatus::Miss);
    assert_eq!(text(&reordered.content), "init();run()\n");

    // Reloading an identical model leaves cached content alone.
    harness.model_flag.raise();
    let again = harness.manager.process(&request).await.expect("same model");
    assert_eq!(again.status, CacheStatus::Hit);
    assert_eq!(harness.loader.load_count(), 3);
}

#[tokio::test]
async fn test_failed_reload_serves_previous_model() {
    let harness = Harness::new(site_model(), site_reader(), HarnessOptions::default());
    let request = GroupRequest::new("site", Some(ResourceKind::Script), false);
    harness.manager.process(&request).await.expect("initial");

    harness.loader.set_failing(true);
    harness.model_flag.raise();
    harness.content_flag.raise();

    let read = harness.manager.process(&request).await.expect("stale model served");
    assert_eq!(read.status, CacheStatus::Miss);
    assert_eq!(text(&read.content), "run()\ninit();");

    let counts = harness.sink.counts();
    assert_eq!(counts.model_refresh_failed, 1);
    assert_eq!(counts.served_stale, 1);
    assert!(harness.model_flag.is_raised(), "failed reload is retried on next resolution");

    harness.loader.set_failing(false);
    harness.content_flag.raise();
    harness.manager.process(&request).await.expect("recovered");
    assert_eq!(harness.loader.load_count(), 3);
    assert!(!harness.model_flag.is_raised());
}

#[tokio::test]
async fn test_cold_start_is_retried() {
    let loader = MockModelLoader::new(site_model());
    loader.set_failing(true);
    let harness = Harness::with_loader(loader, site_reader(), HarnessOptions::default());
    let request = GroupRequest::new("site", None, true);

    let err = harness.manager.process(&request).await.unwrap_err();
    assert!(err.is_cold_start());
    assert!(matches!(err, ManagerError::LoadFailed(ModelError::ColdStart(_))));
    assert!(harness.provider.snapshot().is_none());

    // Cold start fails every group alike, known or not.
    let other = harness.manager.process(&GroupRequest::new("nope", None, true)).await.unwrap_err();
    assert!(other.is_cold_start());

    harness.loader.set_failing(false);
    harness.manager.process(&request).await.expect("loads on retry");
    assert_eq!(harness.loader.load_count(), 3);
    assert_eq!(harness.sink.counts().model_refresh_failed, 2);
}

#[tokio::test]
async fn test_process_to_writes_output() {
    let harness = Harness::new(site_model(), site_reader(), HarnessOptions::default());
    let mut out = Vec::new();

    let written = harness
        .manager
        .process_to(&GroupRequest::new("site", Some(ResourceKind::Script), false), &mut out)
        .await
        .expect("written");

    assert_eq!(out, written.content.to_vec());
    assert_eq!(out, b"run()\ninit();");
}

#[tokio::test]
async fn test_file_backed_pipeline() {
    let dir = tempfile::tempdir().expect("tempdir");
    let root = dir.path().join("web");
    std::fs::create_dir_all(root.join("css")).expect("css dir");
    std::fs::write(root.join("css/base.css"), "body {\n  margin: 0;\n}\n").expect("base.css");
    std::fs::write(root.join("main.js"), "start()").expect("main.js");

    let model_path = dir.path().join("groups.toml");
    std::fs::write(
        &model_path,
        r#"
[[groups]]
name = "site"
resources = [
    { kind = "style", uri = "css/base.css" },
    { kind = "script", uri = "main.js" },
]
"#,
    )
    .expect("model file");

    let provider = Arc::new(ModelProvider::new(
        Arc::new(FileModelLoader::new(&model_path)),
        Duration::from_secs(60),
        Arc::new(StalenessFlag::new()),
        Arc::new(NoopSink),
    ));
    let cache = Arc::new(ContentCache::new(
        ContentCacheConfig::default(),
        Arc::new(StalenessFlag::new()),
        Arc::new(NoopSink),
    ));
    let manager = RequestManager::new(
        provider,
        cache,
        Arc::new(ProcessorChain::standard(BTreeMap::new(), ErrorPolicy::FailFast)),
        Arc::new(FsResourceReader::new(&root)),
        Arc::new(NoopSink),
    );

    let css = manager.process(&GroupRequest::from_path("/assets/site.css", None).expect("path")).await.expect("css");
    assert_eq!(text(&css.content), "body {\nmargin: 0;\n}");

    let js = manager
        .process(&GroupRequest::from_path("/assets/site.js", Some("minimize=false")).expect("path"))
        .await
        .expect("js");
    assert_eq!(text(&js.content), "start();\n");
}
