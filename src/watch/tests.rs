use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tempfile::TempDir;
use tokio::sync::mpsc;

use super::debouncer::{Debouncer, is_temp_file};
use super::{ChangeKind, WatchCoordinator, WatchOptions, WatchSet, WatchState};
use crate::bundle::Bundle;
use crate::env::{Environment, EnvironmentOptions};
use crate::filter::{CommandFilter, FilterRegistry};
use crate::profile::Profile;
use crate::utils::path::normalize_path;

const DEBOUNCE: Duration = Duration::from_millis(300);
const COOLDOWN: Duration = Duration::from_millis(800);

fn make_event(paths: Vec<&str>, kind: notify::EventKind) -> notify::Event {
    notify::Event {
        kind,
        paths: paths.into_iter().map(PathBuf::from).collect(),
        attrs: Default::default(),
    }
}

fn modify_event(path: &Path) -> notify::Event {
    notify::Event {
        kind: modify_kind(),
        paths: vec![path.to_path_buf()],
        attrs: Default::default(),
    }
}

fn modify_kind() -> notify::EventKind {
    notify::EventKind::Modify(notify::event::ModifyKind::Data(
        notify::event::DataChange::Any,
    ))
}

fn metadata_kind() -> notify::EventKind {
    notify::EventKind::Modify(notify::event::ModifyKind::Metadata(
        notify::event::MetadataKind::WriteTime,
    ))
}

fn create_kind() -> notify::EventKind {
    notify::EventKind::Create(notify::event::CreateKind::File)
}

fn remove_kind() -> notify::EventKind {
    notify::EventKind::Remove(notify::event::RemoveKind::File)
}

// ============================================================================
// debouncer
// ============================================================================

#[test]
fn test_debouncer_empty() {
    let debouncer = Debouncer::new(DEBOUNCE, COOLDOWN);
    assert!(!debouncer.is_ready());
    assert_eq!(debouncer.sleep_duration(), Duration::from_secs(86400));
}

#[test]
fn test_event_routing_by_kind() {
    let mut debouncer = Debouncer::new(DEBOUNCE, COOLDOWN);

    debouncer.add_event(&make_event(vec!["/tmp/a.css"], create_kind()));
    debouncer.add_event(&make_event(vec!["/tmp/b.css"], modify_kind()));
    debouncer.add_event(&make_event(vec!["/tmp/c.css"], remove_kind()));

    assert_eq!(debouncer.changes.len(), 3);
    assert_eq!(debouncer.changes[&PathBuf::from("/tmp/a.css")], ChangeKind::Created);
    assert_eq!(debouncer.changes[&PathBuf::from("/tmp/b.css")], ChangeKind::Modified);
    assert_eq!(debouncer.changes[&PathBuf::from("/tmp/c.css")], ChangeKind::Removed);
}

#[test]
fn test_metadata_only_ignored() {
    let mut debouncer = Debouncer::new(DEBOUNCE, COOLDOWN);
    debouncer.add_event(&make_event(vec!["/tmp/a.css"], metadata_kind()));
    assert!(debouncer.changes.is_empty());
    assert!(debouncer.last_event.is_none());
}

#[test]
fn test_temp_file_ignored() {
    let mut debouncer = Debouncer::new(DEBOUNCE, COOLDOWN);

    debouncer.add_event(&make_event(vec!["/tmp/real.css"], modify_kind()));
    let first_time = debouncer.last_event.unwrap();

    std::thread::sleep(Duration::from_millis(5));

    debouncer.add_event(&make_event(vec!["/tmp/.app.css.swp"], modify_kind()));
    debouncer.add_event(&make_event(vec!["/tmp/app.css~"], modify_kind()));
    assert_eq!(debouncer.last_event.unwrap(), first_time);
    assert_eq!(debouncer.changes.len(), 1);
}

#[test]
fn test_is_temp_file() {
    assert!(is_temp_file(Path::new("/a/.tmpA1b2C3")));
    assert!(is_temp_file(Path::new("/a/app.js.bak")));
    assert!(is_temp_file(Path::new("/a/.#app.js")));
    assert!(is_temp_file(Path::new("/a/#app.js#")));
    assert!(!is_temp_file(Path::new("/a/app.js")));
    assert!(!is_temp_file(Path::new("/a/css/.theme.css")));
}

#[test]
fn test_dotfile_source_is_tracked() {
    let mut debouncer = Debouncer::new(DEBOUNCE, COOLDOWN);

    debouncer.add_event(&make_event(vec!["/tmp/css/.theme.css"], modify_kind()));
    debouncer.add_event(&make_event(vec!["/tmp/css/.tmpX9y8Z7"], create_kind()));

    assert_eq!(debouncer.changes.len(), 1);
    assert!(debouncer.changes.contains_key(&PathBuf::from("/tmp/css/.theme.css")));
}

#[test]
fn test_dedup_first_event_wins() {
    let mut debouncer = Debouncer::new(DEBOUNCE, COOLDOWN);

    debouncer.add_event(&make_event(vec!["/tmp/a.css"], create_kind()));
    debouncer.add_event(&make_event(vec!["/tmp/a.css"], modify_kind()));

    assert_eq!(debouncer.changes.len(), 1);
    assert_eq!(debouncer.changes[&PathBuf::from("/tmp/a.css")], ChangeKind::Created);
}

#[test]
fn test_dedup_modified_then_removed() {
    let mut debouncer = Debouncer::new(DEBOUNCE, COOLDOWN);
    debouncer.add_event(&make_event(vec!["/tmp/a.css"], modify_kind()));
    debouncer.add_event(&make_event(vec!["/tmp/a.css"], remove_kind()));
    assert_eq!(debouncer.changes[&PathBuf::from("/tmp/a.css")], ChangeKind::Removed);
}

#[test]
fn test_dedup_created_then_removed_discarded() {
    let mut debouncer = Debouncer::new(DEBOUNCE, COOLDOWN);
    debouncer.add_event(&make_event(vec!["/tmp/a.css"], create_kind()));
    debouncer.add_event(&make_event(vec!["/tmp/a.css"], remove_kind()));
    assert!(debouncer.changes.is_empty());
}

#[test]
fn test_removed_then_restored() {
    let mut debouncer = Debouncer::new(DEBOUNCE, COOLDOWN);
    debouncer.add_event(&make_event(vec!["/tmp/a.css"], remove_kind()));
    debouncer.add_event(&make_event(vec!["/tmp/a.css"], create_kind()));
    assert_eq!(debouncer.changes[&PathBuf::from("/tmp/a.css")], ChangeKind::Created);
}

#[test]
fn test_ready_after_debounce() {
    let mut debouncer = Debouncer::new(Duration::from_millis(20), Duration::ZERO);
    debouncer.add_event(&make_event(vec!["/tmp/a.css"], modify_kind()));
    assert!(!debouncer.is_ready());

    std::thread::sleep(Duration::from_millis(30));
    let changes = debouncer.take_if_ready().unwrap();
    assert_eq!(changes.len(), 1);
    assert!(debouncer.take_if_ready().is_none());
}

#[test]
fn test_cooldown_after_build() {
    let mut debouncer = Debouncer::new(Duration::ZERO, Duration::from_secs(60));
    debouncer.mark_built();
    debouncer.add_event(&make_event(vec!["/tmp/a.css"], modify_kind()));

    assert!(!debouncer.is_ready());
    assert!(debouncer.sleep_duration() > Duration::from_secs(50));
}

// ============================================================================
// watch set + coordinator
// ============================================================================

fn fixture() -> (TempDir, PathBuf) {
    let dir = TempDir::new().unwrap();
    let assets = normalize_path(dir.path()).join("assets");
    fs::create_dir_all(assets.join("css")).unwrap();
    fs::create_dir_all(assets.join("scss")).unwrap();
    fs::write(assets.join("css/a.css"), "a{}").unwrap();
    fs::write(assets.join("css/b.css"), "b{}").unwrap();
    fs::write(assets.join("scss/_vars.scss"), "$x: 1;").unwrap();
    (dir, assets)
}

fn make_env(assets: &Path, filters: &[&str], registry: FilterRegistry) -> Arc<Environment> {
    let bundle = Bundle::new("app_css", "gen/app.css")
        .with_contents(["css/*.css"])
        .with_depends(["scss/*.scss"])
        .with_filters(filters.iter().copied());
    let options = EnvironmentOptions {
        directory: Some(assets.to_path_buf()),
        profile: Profile::Development,
        filters: registry,
        ..EnvironmentOptions::default()
    };
    Arc::new(Environment::new(vec![bundle], options).unwrap())
}

async fn wait_for(mut cond: impl FnMut() -> bool, timeout: Duration) -> bool {
    let start = Instant::now();
    while start.elapsed() < timeout {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    cond()
}

#[test]
fn test_watch_set_relevance() {
    let (_dir, assets) = fixture();
    let env = make_env(&assets, &[], FilterRegistry::with_builtins());
    let set = WatchSet::capture(&env).with_outputs([assets.join("gen/app.css")]);

    assert!(set.is_relevant(&assets.join("css/a.css")));
    assert!(set.is_relevant(&assets.join("scss/_vars.scss")));
    // not yet existing, but matched by a glob
    assert!(set.is_relevant(&assets.join("css/new.css")));
    assert!(!set.is_relevant(&assets.join("css/nested/x.css")));
    assert!(!set.is_relevant(&assets.join("gen/app.css")));
    assert!(!set.is_relevant(&assets.join("notes.txt")));
}

#[tokio::test]
async fn test_inert_environment_cannot_watch() {
    let env = Arc::new(Environment::new(vec![], EnvironmentOptions::default()).unwrap());
    let result = WatchCoordinator::new(env, WatchOptions::default()).start();
    assert!(matches!(result, Err(super::WatchError::NoDirectory)));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_irrelevant_events_do_not_build() {
    let (_dir, assets) = fixture();
    let env = make_env(&assets, &[], FilterRegistry::with_builtins());
    let options = WatchOptions {
        debounce: Duration::from_millis(20),
        cooldown: Duration::ZERO,
    };

    let (tx, rx) = mpsc::channel(64);
    let handle = WatchCoordinator::new(Arc::clone(&env), options).spawn(rx, None);
    assert_eq!(handle.state(), WatchState::Watching);

    tx.send(modify_event(&assets.join("readme.txt"))).await.unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(env.stats().passes, 0);

    tx.send(modify_event(&assets.join("css/a.css"))).await.unwrap();
    assert!(wait_for(|| env.stats().passes == 1, Duration::from_secs(5)).await);
    assert!(assets.join("gen/app.css").is_file());

    handle.shutdown().await.unwrap();
}

#[cfg(unix)]
#[tokio::test(flavor = "multi_thread")]
async fn test_events_during_build_coalesce() {
    let (_dir, assets) = fixture();
    let mut registry = FilterRegistry::with_builtins();
    registry.register(CommandFilter::new(
        "slow",
        ["sh", "-c", "sleep 0.4; cat"].map(String::from).to_vec(),
    ));
    let env = make_env(&assets, &["slow"], registry);
    let options = WatchOptions {
        debounce: Duration::from_millis(20),
        cooldown: Duration::ZERO,
    };

    let (tx, rx) = mpsc::channel(64);
    let handle = WatchCoordinator::new(Arc::clone(&env), options).spawn(rx, None);

    tx.send(modify_event(&assets.join("css/a.css"))).await.unwrap();
    assert!(wait_for(|| env.stats().in_flight == 1, Duration::from_secs(5)).await);
    assert_eq!(handle.state(), WatchState::Building);

    // Two changes while the first pass is running
    tx.send(modify_event(&assets.join("css/b.css"))).await.unwrap();
    tx.send(modify_event(&assets.join("scss/_vars.scss"))).await.unwrap();

    assert!(wait_for(|| env.stats().passes == 2, Duration::from_secs(5)).await);
    assert!(wait_for(|| env.stats().in_flight == 0, Duration::from_secs(5)).await);
    tokio::time::sleep(Duration::from_millis(300)).await;

    let stats = env.stats();
    assert_eq!(stats.passes, 2);
    assert_eq!(stats.max_in_flight, 1);

    handle.shutdown().await.unwrap();
}

#[cfg(unix)]
#[tokio::test(flavor = "multi_thread")]
async fn test_shutdown_waits_for_build() {
    let (_dir, assets) = fixture();
    let mut registry = FilterRegistry::with_builtins();
    registry.register(CommandFilter::new(
        "slow",
        ["sh", "-c", "sleep 0.3; cat"].map(String::from).to_vec(),
    ));
    let env = make_env(&assets, &["slow"], registry);
    let options = WatchOptions {
        debounce: Duration::from_millis(10),
        cooldown: Duration::ZERO,
    };

    let (tx, rx) = mpsc::channel(64);
    let handle = WatchCoordinator::new(Arc::clone(&env), options).spawn(rx, None);

    tx.send(modify_event(&assets.join("css/a.css"))).await.unwrap();
    assert!(wait_for(|| env.stats().in_flight == 1, Duration::from_secs(5)).await);

    handle.shutdown().await.unwrap();
    let stats = env.stats();
    assert_eq!(stats.passes, 1);
    assert_eq!(stats.in_flight, 0);
    assert!(assets.join("gen/app.css").is_file());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_real_watcher_rebuilds_on_change() {
    let (_dir, assets) = fixture();
    let env = make_env(&assets, &[], FilterRegistry::with_builtins());
    let options = WatchOptions {
        debounce: Duration::from_millis(50),
        cooldown: Duration::ZERO,
    };

    let handle = WatchCoordinator::new(Arc::clone(&env), options)
        .start()
        .unwrap();
    // Give the backend a moment to settle before touching files
    tokio::time::sleep(Duration::from_millis(200)).await;

    fs::write(assets.join("css/b.css"), "b{color:red}").unwrap();
    assert!(wait_for(|| env.stats().passes >= 1, Duration::from_secs(10)).await);
    assert!(wait_for(
        || fs::read_to_string(assets.join("gen/app.css")).is_ok_and(|s| s.contains("color:red")),
        Duration::from_secs(10),
    )
    .await);

    handle.shutdown().await.unwrap();
}
