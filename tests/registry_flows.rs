mod common;

use std::fs;
use std::path::{Path, PathBuf};

use rand::rngs::StdRng;
use rand::SeedableRng as _;
use stackyard::instance::find_orphans;
use stackyard::registry::{read_marker, InstanceStatus};
use stackyard::{ErrorKind, FixedAnswer};

use common::{always_free, FakeRuntime, Harness};

fn create(h: &Harness, name: &str, seed: u64) -> PathBuf {
    let mut rng = StdRng::seed_from_u64(seed);
    h.orchestrator(&always_free)
        .create(h.options(name), &mut rng)
        .unwrap()
        .record
        .directory
}

fn hand_made_instance(parent: &Path, name: &str, env: &str) -> PathBuf {
    let dir = parent.join(name);
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join("docker-compose.yml"), "services: {}\n").unwrap();
    fs::write(dir.join(".env"), env).unwrap();
    dir
}

#[test]
fn refresh_reports_running_and_missing_instances() {
    let h = Harness::with_runtime(FakeRuntime {
        running: vec!["wordpress".to_string(), "mailpit".to_string()],
        ..FakeRuntime::default()
    });
    let live = create(&h, "live", 1);
    let gone = create(&h, "gone", 2);
    fs::remove_dir_all(&gone).unwrap();

    let changes = h.orchestrator(&always_free).refresh_statuses().unwrap();

    assert_eq!(changes.len(), 2);
    assert_eq!(h.registry.get("live").unwrap().status, InstanceStatus::Running);
    assert_eq!(
        h.registry.get("gone").unwrap().status,
        InstanceStatus::DirectoryMissing
    );
    let marker = read_marker(&live).unwrap().unwrap();
    assert_eq!(marker.status, InstanceStatus::Running);

    // A second scan with nothing new changes nothing.
    assert!(h.orchestrator(&always_free).refresh_statuses().unwrap().is_empty());
}

#[test]
fn refresh_marks_unqueryable_instances_unknown() {
    let h = Harness::with_runtime(FakeRuntime {
        fail_queries: true,
        ..FakeRuntime::default()
    });
    create(&h, "quiet", 3);

    let changes = h.orchestrator(&always_free).refresh_statuses().unwrap();

    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0].from, InstanceStatus::Stopped);
    assert_eq!(changes[0].to, InstanceStatus::Unknown);
}

#[test]
fn register_existing_seeds_record_from_env() {
    let h = Harness::new();
    let dir = hand_made_instance(
        &h.sites(),
        "blog",
        "WEB_PORT=12345\nSOFTWARE_VERSION=6.4\nDB_VERSION=10.11\n",
    );

    let registered = h
        .orchestrator(&always_free)
        .register_existing(&dir, None)
        .unwrap();

    assert_eq!(registered.name, "blog");
    assert!(registered.replaced.is_empty());
    let record = h.registry.get("blog").unwrap();
    assert_eq!(record.assigned_port, Some(12345));
    assert_eq!(record.software_version, "6.4");
    assert_eq!(record.database_version, "10.11");
}

#[test]
fn register_existing_rejects_directory_without_compose_files() {
    let h = Harness::new();
    let dir = h.sites().join("bare");
    fs::create_dir_all(&dir).unwrap();

    let err = h
        .orchestrator(&always_free)
        .register_existing(&dir, None)
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::InvalidPath);
    assert!(h.registry.list().unwrap().is_empty());
}

#[test]
fn declined_name_conflict_keeps_existing_entry() {
    let mut h = Harness::new();
    let original = hand_made_instance(&h.sites(), "blog", "WEB_PORT=12000\n");
    let other = hand_made_instance(&h.temp.path().join("elsewhere"), "blog", "WEB_PORT=13000\n");
    h.orchestrator(&always_free)
        .register_existing(&original, None)
        .unwrap();

    h.answer = FixedAnswer(false);
    let err = h
        .orchestrator(&always_free)
        .register_existing(&other, Some("blog"))
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::NameConflict);
    assert_eq!(h.registry.get("blog").unwrap().assigned_port, Some(12000));
}

#[test]
fn confirmed_name_conflict_replaces_entry() {
    let h = Harness::new();
    let original = hand_made_instance(&h.sites(), "blog", "WEB_PORT=12000\n");
    let other = hand_made_instance(&h.temp.path().join("elsewhere"), "blog", "WEB_PORT=13000\n");
    h.orchestrator(&always_free)
        .register_existing(&original, None)
        .unwrap();

    let registered = h
        .orchestrator(&always_free)
        .register_existing(&other, Some("blog"))
        .unwrap();

    assert_eq!(registered.replaced, vec!["blog".to_string()]);
    let record = h.registry.get("blog").unwrap();
    assert_eq!(record.assigned_port, Some(13000));
    assert_eq!(record.directory, registered.record.directory);
}

#[test]
fn confirmed_directory_conflict_renames_entry() {
    let h = Harness::new();
    let dir = hand_made_instance(&h.sites(), "blog", "WEB_PORT=12000\n");
    h.orchestrator(&always_free)
        .register_existing(&dir, None)
        .unwrap();

    let registered = h
        .orchestrator(&always_free)
        .register_existing(&dir, Some("journal"))
        .unwrap();

    assert_eq!(registered.replaced, vec!["blog".to_string()]);
    let map = h.registry.list().unwrap();
    assert_eq!(map.keys().collect::<Vec<_>>(), vec!["journal"]);
}

#[test]
fn prune_removes_only_missing_directories() {
    let h = Harness::new();
    create(&h, "kept", 4);
    let doomed = create(&h, "doomed", 5);
    fs::remove_dir_all(doomed).unwrap();

    let removed = h.orchestrator(&always_free).prune().unwrap();

    assert_eq!(removed, vec!["doomed".to_string()]);
    let map = h.registry.list().unwrap();
    assert_eq!(map.keys().collect::<Vec<_>>(), vec!["kept"]);
}

#[test]
fn declined_prune_changes_nothing() {
    let mut h = Harness::new();
    let doomed = create(&h, "doomed", 6);
    fs::remove_dir_all(doomed).unwrap();
    h.answer = FixedAnswer(false);

    let err = h.orchestrator(&always_free).prune().unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Cancelled);
    assert!(h.registry.get("doomed").is_ok());
}

#[test]
fn prune_with_nothing_missing_is_a_no_op() {
    let h = Harness::new();
    create(&h, "healthy", 7);

    assert!(h.orchestrator(&always_free).prune().unwrap().is_empty());
    assert_eq!(h.registry.list().unwrap().len(), 1);
}

#[test]
fn unregistered_instance_is_found_and_adopted() {
    let h = Harness::new();
    let dir = create(&h, "lost", 8);
    let port = h.registry.get("lost").unwrap().assigned_port;
    create(&h, "found", 9);
    h.registry.unregister("lost").unwrap();
    assert!(dir.exists());

    let orphans = find_orphans(&h.sites(), &h.registry.list().unwrap()).unwrap();
    assert_eq!(orphans.len(), 1);
    assert_eq!(orphans[0].name(), "lost");

    let name = h.orchestrator(&always_free).adopt(&orphans[0]).unwrap();

    assert_eq!(name, "lost");
    assert_eq!(h.registry.get("lost").unwrap().assigned_port, port);
    assert!(find_orphans(&h.sites(), &h.registry.list().unwrap())
        .unwrap()
        .is_empty());
}

#[test]
fn discarded_orphan_is_deleted() {
    let h = Harness::new();
    let dir = create(&h, "stray", 10);
    h.registry.unregister("stray").unwrap();
    let orphans = find_orphans(&h.sites(), &h.registry.list().unwrap()).unwrap();

    h.orchestrator(&always_free).discard(&orphans[0]).unwrap();

    assert!(!dir.exists());
    assert_eq!(*h.runtime.torn_down.borrow(), vec![dir]);
}

#[test]
fn versions_are_updated_independently() {
    let h = Harness::new();
    create(&h, "site", 11);

    h.registry.record_versions("site", Some("6.6"), None).unwrap();
    let record = h.registry.get("site").unwrap();
    assert_eq!(record.software_version, "6.6");
    assert_eq!(record.database_version, "11.4");

    let err = h
        .registry
        .record_versions("ghost", None, Some("10.6"))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InstanceNotFound);
}

#[test]
fn status_scan_over_corrupt_registry_keeps_file() {
    let h = Harness::new();
    h.registry.layout().ensure().unwrap();
    let broken = "{ \"a\": { \"directory\": ";
    fs::write(h.registry.path(), broken).unwrap();

    let changes = h.orchestrator(&always_free).refresh_statuses().unwrap();

    assert!(changes.is_empty());
    assert_eq!(fs::read_to_string(h.registry.path()).unwrap(), broken);
}
