//! Integration tests for the photon loader
//!
//! Drives load, unload, atomic reload and the watch loop against Rhai
//! photon scripts written to temporary directories.

use luminal_plugins::hot_reload::{
    Handle, HandleState, LoadOptions, LoadOutcome, Loader, LoaderConfig, LoaderError, LoaderEvent,
    LoopTask, LoopTrace, PhotonTarget, ReloadOutcome,
};
use luminal_plugins::rhai_runtime::{RhaiObject, RhaiPhoton, RhaiResolver};
use luminal_plugins::PhotonError;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

// ============================================================================
// Fixtures
// ============================================================================

const ALPHA: &str = r#"let label = "alpha";

fn init() { #{ pings: 0 } }
fn finalize(state) { true }
fn ping(state) { "pong" }

#{
    type_name: "Alpha",
    photon: #{
        name: label,
        author: "luminal",
        version: "1.0.0",
        description: "Photon with a finalizer",
    },
    init: Fn("init"),
    finalize: Fn("finalize"),
}
"#;

const SIGMA: &str = r#"let label = "sigma";

#{ type_name: "Sigma", photon: #{ name: label } }
"#;

const GAMMA: &str = r#"let label = "gamma";

#{ type_name: "Gamma", photon: #{ name: label } }
"#;

const DELTA: &str = r#"let label = "delta";

fn init() { #{ label: "delta" } }

#{ type_name: "Delta", init: Fn("init") }
"#;

const OMEGA: &str = r#"let suite = "omega";

fn finalize(state) { true }

[
    #{ type_name: "Omega", photon: #{ name: suite }, finalize: Fn("finalize") },
    #{ type_name: "Gamma", photon: #{ name: "gamma" } },
    #{ type_name: "Lambda" },
]
"#;

const PAIR: &str = r#"let suite = "pair";

fn finalize(state) { true }

[
    #{ type_name: "Alpha", photon: #{ name: "alpha" }, finalize: Fn("finalize") },
    #{ type_name: "Zeta", photon: #{ name: "zeta" } },
]
"#;

// ============================================================================
// Helper Functions
// ============================================================================

fn loader() -> Loader {
    Loader::new(RhaiResolver::default())
}

async fn write(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    tokio::fs::write(&path, body).await.expect("Failed to write photon");
    path
}

async fn load_single(loader: &Loader, path: &Path) -> Arc<Handle> {
    match loader
        .load_one(path, &LoadOptions::default())
        .await
        .expect("Failed to load photon")
    {
        LoadOutcome::One(handle) => handle,
        other => panic!("expected exactly one handle, got {other:?}"),
    }
}

async fn ping(handle: &Handle) -> Option<String> {
    handle
        .with_instance(|instance| {
            instance
                .downcast_ref::<RhaiPhoton>()
                .and_then(|photon| photon.call("ping").ok())
                .and_then(|value| value.into_string().ok())
        })
        .await
        .flatten()
}

async fn wait_until_idle(loader: &Loader) {
    for _ in 0..500 {
        if !loader.is_watching() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("watch loop did not finish");
}

// ============================================================================
// Loading and Unloading
// ============================================================================

#[tokio::test]
async fn test_load_registers_handle_and_modules() {
    let dir = TempDir::new().unwrap();
    let path = write(dir.path(), "alpha.rhai", ALPHA).await;
    let loader = loader();

    let handle = load_single(&loader, &path).await;

    assert_eq!(handle.name(), "alpha");
    assert_eq!(handle.module_name(), "alpha");
    assert_eq!(handle.filepath(), path.as_path());
    assert_eq!(handle.checksum().map(str::len), Some(128));
    assert_eq!(handle.state().await, HandleState::Unresolved);
    assert_eq!(loader.names().await, vec!["alpha"]);
    assert!(loader.modules().contains("alpha"));
    assert!(loader.modules().contains("alpha.alpha"));

    handle.start().await;
    assert!(handle.is_started().await);
    assert_eq!(ping(&handle).await.as_deref(), Some("pong"));

    assert!(loader.unload_one(&handle, false).await.unwrap());
    assert!(loader.is_empty().await);
    assert!(loader.modules().is_empty());
    assert_eq!(handle.state().await, HandleState::Disposed);
}

#[tokio::test]
async fn test_unload_before_start_is_not_initialized() {
    let dir = TempDir::new().unwrap();
    let path = write(dir.path(), "alpha.rhai", ALPHA).await;
    let loader = loader();
    let handle = load_single(&loader, &path).await;

    let err = loader.unload_one(&handle, false).await.unwrap_err();
    assert!(matches!(
        err.photon_error(),
        Some(PhotonError::NotInitialized(name)) if name == "alpha"
    ));
    assert_eq!(loader.len().await, 1);
}

#[tokio::test]
async fn test_unload_missing_targets() {
    let dir = TempDir::new().unwrap();
    let loader = loader();

    assert!(!loader.unload_one("nobody", false).await.unwrap());

    let err = loader
        .unload_one(dir.path().join("ghost.rhai").as_path(), false)
        .await
        .unwrap_err();
    assert!(matches!(err, LoaderError::NotFound(_)));

    let err = loader.unload_one("", false).await.unwrap_err();
    assert!(matches!(err, LoaderError::InvalidArgument(_)));
}

#[tokio::test]
async fn test_load_missing_or_invalid_paths() {
    let dir = TempDir::new().unwrap();
    let loader = loader();
    let options = LoadOptions::default();

    let err = loader.load_one("", &options).await.unwrap_err();
    assert!(matches!(err, LoaderError::NotFound(_)));

    let err = loader
        .load_one(dir.path().join("missing.rhai"), &options)
        .await
        .unwrap_err();
    assert!(matches!(err, LoaderError::NotFound(_)));

    let err = loader.load_one(dir.path(), &options).await.unwrap_err();
    assert!(matches!(err, LoaderError::NotFound(_)));

    let err = loader
        .load_one(dir.path(), &LoadOptions::default().with_capability(" "))
        .await
        .unwrap_err();
    assert!(matches!(err, LoaderError::InvalidArgument(_)));
}

#[tokio::test]
async fn test_syntax_error_is_skipped() {
    let dir = TempDir::new().unwrap();
    let path = write(dir.path(), "broken.rhai", &ALPHA[1..]).await;
    let loader = loader();

    let outcome = loader.load_one(&path, &LoadOptions::default()).await.unwrap();
    assert!(outcome.is_none());
    assert!(loader.is_empty().await);
    assert!(loader.modules().is_empty());
}

#[tokio::test]
async fn test_execution_error_propagates() {
    let dir = TempDir::new().unwrap();
    let path = write(dir.path(), "throws.rhai", "let x = 1;\nthrow \"boom\";").await;
    let loader = loader();

    let err = loader.load_one(&path, &LoadOptions::default()).await.unwrap_err();
    assert!(matches!(err, LoaderError::Resolve(_)));
}

#[tokio::test]
async fn test_plain_units_need_explicit_type_names() {
    let dir = TempDir::new().unwrap();
    let path = write(dir.path(), "delta.rhai", DELTA).await;
    let loader = loader();

    let outcome = loader.load_one(&path, &LoadOptions::default()).await.unwrap();
    assert!(outcome.is_none());

    let options = LoadOptions::default().with_type_names(["Delta"]);
    let handle = loader
        .load_one(&path, &options)
        .await
        .unwrap()
        .into_vec()
        .pop()
        .expect("Delta should load by type name");
    handle.start().await;

    let label = handle
        .with_instance(|instance| {
            assert!(!instance.is_photon());
            instance
                .downcast_ref::<RhaiObject>()
                .and_then(|object| object.state().clone().try_cast::<rhai::Map>())
                .and_then(|state| state.get("label").cloned())
                .and_then(|label| label.into_string().ok())
        })
        .await
        .flatten();
    assert_eq!(label.as_deref(), Some("delta"));

    // Plain instances take the forced path even when stopped gracefully.
    assert!(loader.unload_one("Delta", false).await.unwrap());
    assert!(loader.is_empty().await);
}

#[tokio::test]
async fn test_second_load_of_same_module_is_skipped() {
    let dir = TempDir::new().unwrap();
    let path = write(dir.path(), "alpha.rhai", ALPHA).await;
    let loader = loader();

    let first = load_single(&loader, &path).await;
    let second = loader.load_one(&path, &LoadOptions::default()).await.unwrap();

    assert!(second.is_none());
    assert!(Arc::ptr_eq(&first, &loader.get("alpha").await.unwrap()));
}

#[tokio::test]
async fn test_multi_unit_source() {
    let dir = TempDir::new().unwrap();
    let path = write(dir.path(), "omega.rhai", OMEGA).await;
    let loader = loader();

    let outcome = loader.load_one(&path, &LoadOptions::default()).await.unwrap();
    assert_eq!(outcome.len(), 2);
    assert_eq!(loader.names().await, vec!["gamma", "omega"]);
    assert!(loader.modules().contains("omega.gamma"));
    assert!(loader.modules().contains("omega.omega"));

    loader.start_all().await;

    // Naming one unit unloads every unit of its source.
    assert!(loader.unload_one("omega", true).await.unwrap());
    assert!(loader.is_empty().await);
    assert!(loader.modules().is_empty());
}

#[tokio::test]
async fn test_failed_multi_unit_unload_keeps_survivor() {
    let dir = TempDir::new().unwrap();
    let path = write(dir.path(), "pair.rhai", PAIR).await;
    let loader = loader();

    let outcome = loader.load_one(&path, &LoadOptions::default()).await.unwrap();
    assert_eq!(outcome.len(), 2);
    loader.start_all().await;
    let zeta = loader.get("zeta").await.unwrap();

    let err = loader.unload_one("alpha", false).await.unwrap_err();
    assert!(matches!(
        err.photon_error(),
        Some(PhotonError::FinalizerNotImplemented)
    ));
    assert_eq!(loader.names().await, vec!["zeta"]);

    // The source still has a live unit, so loading it again is a no-op.
    let again = loader.load_one(&path, &LoadOptions::default()).await.unwrap();
    assert!(again.is_none());
    assert_eq!(loader.names().await, vec!["zeta"]);
    assert!(Arc::ptr_eq(&loader.get("zeta").await.unwrap(), &zeta));
    assert_eq!(zeta.state().await, HandleState::Resolved);

    assert!(loader.unload_one(&zeta, true).await.unwrap());
    assert!(loader.is_empty().await);
}

// ============================================================================
// Directories and Batch Unload
// ============================================================================

#[tokio::test]
async fn test_load_many_and_partial_unload() {
    let dir = TempDir::new().unwrap();
    let alpha_path = write(dir.path(), "alpha.rhai", ALPHA).await;
    write(dir.path(), "sigma.rhai", SIGMA).await;
    write(dir.path(), "delta.rhai", DELTA).await;
    write(dir.path(), "notes.txt", "not a photon").await;
    let loader = loader();

    let handles = loader
        .load_many(dir.path(), &LoadOptions::default())
        .await
        .unwrap();
    let names: Vec<_> = handles.iter().map(|h| h.name().to_string()).collect();
    assert_eq!(names, vec!["alpha", "sigma"]);

    loader.start_all().await;
    for handle in &handles {
        assert!(handle.is_started().await);
    }

    let err = loader.unload_many(handles.clone(), false).await.unwrap_err();
    match &err {
        LoaderError::PartialUnload { unloaded, .. } => assert_eq!(unloaded, &vec![alpha_path]),
        other => panic!("expected a partial unload, got {other:?}"),
    }
    assert!(matches!(
        err.photon_error(),
        Some(PhotonError::FinalizerNotImplemented)
    ));

    assert!(loader.get("alpha").await.is_none());
    assert!(!loader.modules().contains("alpha"));
    assert!(loader.get("sigma").await.is_some());

    let unloaded = loader
        .unload_many([PhotonTarget::from("sigma")], true)
        .await
        .unwrap();
    assert_eq!(unloaded.len(), 1);
    assert!(loader.is_empty().await);
}

#[tokio::test]
async fn test_load_many_descends_into_subdirectories() {
    let dir = TempDir::new().unwrap();
    let nested = dir.path().join("nested");
    tokio::fs::create_dir(&nested).await.unwrap();
    write(&nested, "sigma.rhai", SIGMA).await;
    let loader = loader();

    // No eligible files at the top level, so the sub-directory is searched.
    let handles = loader
        .load_many(dir.path(), &LoadOptions::default())
        .await
        .unwrap();
    assert_eq!(handles.len(), 1);

    write(dir.path(), "gamma.rhai", GAMMA).await;
    let other = Loader::new(RhaiResolver::default());
    let flat = other
        .load_many(dir.path(), &LoadOptions::default())
        .await
        .unwrap();
    assert_eq!(flat.len(), 1);
    assert_eq!(flat[0].name(), "gamma");

    let third = Loader::new(RhaiResolver::default());
    let recursive = third
        .load_many(dir.path(), &LoadOptions::default().with_recursive(true))
        .await
        .unwrap();
    assert_eq!(recursive.len(), 2);
}

#[tokio::test]
async fn test_missing_directory() {
    let dir = TempDir::new().unwrap();
    let missing = dir.path().join("nowhere");
    let loader = loader();

    let err = loader
        .load_many(&missing, &LoadOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, LoaderError::DirectoryNotFound(_)));

    let err = loader.watch(&missing).await.unwrap_err();
    assert!(matches!(err, LoaderError::DirectoryNotFound(_)));
    assert!(!loader.is_watching());
}

// ============================================================================
// Checksums
// ============================================================================

#[tokio::test]
async fn test_checksum() {
    let dir = TempDir::new().unwrap();
    let path = write(dir.path(), "alpha.rhai", ALPHA).await;

    let first = Handle::compute_checksum(&path, 16).await.unwrap();
    let second = Handle::compute_checksum(&path, 1 << 20).await.unwrap();
    assert!(first.is_some());
    assert_eq!(first, second);

    write(dir.path(), "alpha.rhai", SIGMA).await;
    let changed = Handle::compute_checksum(&path, 16).await.unwrap();
    assert_ne!(first, changed);

    assert_eq!(Handle::compute_checksum(dir.path(), 16).await.unwrap(), None);
    assert_eq!(
        Handle::compute_checksum(&dir.path().join("gone.rhai"), 16)
            .await
            .unwrap(),
        None
    );
}

// ============================================================================
// Atomic Reload
// ============================================================================

#[tokio::test]
async fn test_reload_unchanged_source() {
    let dir = TempDir::new().unwrap();
    let path = write(dir.path(), "alpha.rhai", ALPHA).await;
    let loader = loader();
    let original = load_single(&loader, &path).await;

    let outcome = loader.reload_one(&original).await.unwrap();
    assert!(!outcome.is_reverted());

    let reloaded = &outcome.handles()[0];
    assert!(!Arc::ptr_eq(&original, reloaded));
    assert_eq!(reloaded.name(), original.name());
    assert_eq!(reloaded.checksum(), original.checksum());
    assert!(!reloaded.is_started().await);
    assert_eq!(loader.len().await, 1);
    assert!(loader.modules().contains("alpha"));
}

#[tokio::test]
async fn test_reload_reverts_broken_source() {
    let dir = TempDir::new().unwrap();
    let path = write(dir.path(), "alpha.rhai", ALPHA).await;
    let loader = loader();
    let mut events = loader.subscribe();
    let original = load_single(&loader, &path).await;
    original.start().await;

    write(dir.path(), "alpha.rhai", &ALPHA[1..]).await;

    let outcome = loader.reload_one(path.as_path()).await.unwrap();
    let ReloadOutcome::Reverted(handles) = outcome else {
        panic!("broken source should revert");
    };
    assert!(Arc::ptr_eq(&handles[0], &original));
    assert!(original.is_started().await);
    assert_eq!(ping(&original).await.as_deref(), Some("pong"));
    assert!(Arc::ptr_eq(&loader.get("alpha").await.unwrap(), &original));
    assert!(loader.modules().contains("alpha"));

    let mut reverted = false;
    while let Ok(event) = events.try_recv() {
        if let LoaderEvent::Reverted { name, .. } = event {
            reverted = name == "alpha";
        }
    }
    assert!(reverted);
}

#[tokio::test]
async fn test_reload_reverts_when_no_unit_matches() {
    let dir = TempDir::new().unwrap();
    let path = write(dir.path(), "alpha.rhai", ALPHA).await;
    let loader = loader();
    let original = load_single(&loader, &path).await;

    write(dir.path(), "alpha.rhai", "let x = 1;\n#{ type_name: \"Alpha\" }").await;

    let outcome = loader.reload_one("alpha").await.unwrap();
    assert!(outcome.is_reverted());
    assert!(Arc::ptr_eq(&outcome.handles()[0], &original));
    // It was never started, so the revert leaves it unstarted.
    assert_eq!(original.state().await, HandleState::Unresolved);

    original.start().await;
    assert_eq!(ping(&original).await.as_deref(), Some("pong"));
}

#[tokio::test]
async fn test_reload_unknown_target() {
    let loader = loader();
    let err = loader.reload_one("nobody").await.unwrap_err();
    assert!(matches!(err, LoaderError::NotFound(_)));

    let reloaded = loader.reload_many(["nobody"]).await.unwrap();
    assert!(reloaded.is_empty());
}

// ============================================================================
// Watch Loop
// ============================================================================

#[tokio::test]
async fn test_watch_reloads_changes_and_discovers_sources() {
    let dir = TempDir::new().unwrap();
    let alpha = write(dir.path(), "alpha.rhai", ALPHA).await;
    let gamma = dir.path().join("gamma.rhai");

    let config = LoaderConfig::default().with_poll_interval(Duration::from_millis(10));
    let loader = Loader::with_config(RhaiResolver::default(), config);
    let mut events = loader.subscribe();

    let trace = LoopTrace::new(3).with_task(LoopTask::new(0, move |_loader| {
        let alpha = alpha.clone();
        let gamma = gamma.clone();
        async move {
            let touched = format!("{}\n// touched\n", ALPHA);
            tokio::fs::write(&alpha, touched).await.unwrap();
            tokio::fs::write(&gamma, GAMMA).await.unwrap();
        }
    }));

    loader.watch_with_trace(dir.path(), Some(trace)).await.unwrap();
    wait_until_idle(&loader).await;

    assert_eq!(loader.names().await, vec!["alpha", "gamma"]);
    for handle in loader.photons().await {
        assert!(handle.is_started().await, "{} should be started", handle.name());
    }

    let mut reloaded = Vec::new();
    let mut discovered = Vec::new();
    while let Ok(event) = events.try_recv() {
        match event {
            LoaderEvent::Reloaded { name, .. } => reloaded.push(name),
            LoaderEvent::Discovered { path } => discovered.push(path),
            _ => {}
        }
    }
    assert_eq!(reloaded, vec!["alpha"]);
    assert_eq!(discovered.len(), 2);
    assert!(discovered.iter().any(|p| p.ends_with("gamma.rhai")));
}

#[tokio::test]
async fn test_watch_twice_and_stop() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "sigma.rhai", SIGMA).await;

    let config = LoaderConfig::default().with_poll_interval(Duration::from_millis(10));
    let loader = Loader::with_config(RhaiResolver::default(), config);

    loader.watch(dir.path()).await.unwrap();
    assert!(loader.is_watching());

    let err = loader.watch(dir.path()).await.unwrap_err();
    assert!(matches!(err, LoaderError::AlreadyWatching));

    loader.stop_watching(true).await;
    assert!(!loader.is_watching());
    assert_eq!(loader.threads().running_count(), 0);

    loader.watch(dir.path()).await.unwrap();
    assert!(loader.is_watching());
    loader.stop_watching(true).await;
    assert!(!loader.is_watching());
}
