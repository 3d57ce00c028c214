mod common;

use std::collections::BTreeSet;

use rand::rngs::StdRng;
use rand::SeedableRng as _;
use stackyard::instance::TemplateSource;
use stackyard::registry::{read_marker, InstanceRecord, InstanceStatus};
use stackyard::store;
use stackyard::ErrorKind;

use common::{always_free, FakeRuntime, Harness};

#[test]
fn create_lays_out_files_and_registers_last() {
    let h = Harness::new();
    let mut rng = StdRng::seed_from_u64(1);

    let created = h
        .orchestrator(&always_free)
        .create(h.options("calm-otter"), &mut rng)
        .unwrap();

    let dir = h.sites().join("calm-otter");
    assert_eq!(created.record.directory, dir);
    assert!(dir.join("docker-compose.yml").is_file());
    assert!(dir.join(".env").is_file());
    assert!(!dir.join("env-template").exists());

    let record = h.registry.get("calm-otter").unwrap();
    assert_eq!(record, created.record);
    assert_eq!(record.status, InstanceStatus::Stopped);
    assert_eq!(record.software_version, "6.5");
    assert!((11000..=19999).contains(&record.assigned_port.unwrap()));

    let marker = read_marker(&dir).unwrap().unwrap();
    assert_eq!(marker.name, "calm-otter");
    assert_eq!(marker.ports, created.ports);

    let unique: BTreeSet<u16> = created.ports.values().copied().collect();
    assert_eq!(unique.len(), 4);
}

#[test]
fn create_avoids_ports_of_registered_instances() {
    let h = Harness::new();
    // Every web port but the last is held by an existing entry.
    h.registry
        .transact(|map| {
            for port in 11000..=19998u16 {
                let name = format!("i{}", port);
                let record = InstanceRecord::new(h.temp.path().join(&name), Some(port));
                map.insert(name, record);
            }
            Ok(())
        })
        .unwrap();
    let mut rng = StdRng::seed_from_u64(2);

    let created = h
        .orchestrator(&always_free)
        .create(h.options("fresh"), &mut rng)
        .unwrap();

    assert_eq!(created.record.assigned_port, Some(19999));
}

#[test]
fn create_with_fixed_web_port_rejects_claimed_port() {
    let h = Harness::new();
    let mut rng = StdRng::seed_from_u64(3);
    let first = h
        .orchestrator(&always_free)
        .create(h.options("first"), &mut rng)
        .unwrap();

    let mut options = h.options("second");
    options.web_port = first.record.assigned_port;
    let err = h
        .orchestrator(&always_free)
        .create(options, &mut rng)
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::PortOccupied);
    assert!(!h.sites().join("second").exists());
}

#[test]
fn create_rejects_registered_name_and_existing_directory() {
    let h = Harness::new();
    let mut rng = StdRng::seed_from_u64(4);
    h.orchestrator(&always_free)
        .create(h.options("taken"), &mut rng)
        .unwrap();

    let err = h
        .orchestrator(&always_free)
        .create(h.options("taken"), &mut rng)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NameConflict);

    std::fs::create_dir_all(h.sites().join("squatter")).unwrap();
    let err = h
        .orchestrator(&always_free)
        .create(h.options("squatter"), &mut rng)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidPath);
    assert!(h.sites().join("squatter").is_dir());
}

#[test]
fn template_failure_rolls_back_created_directories() {
    let h = Harness::new();
    let mut rng = StdRng::seed_from_u64(5);
    let mut options = h.options("broken");
    options.template = TemplateSource::Directory(h.temp.path().join("no-template"));

    let err = h
        .orchestrator(&always_free)
        .create(options, &mut rng)
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Template);
    assert!(!h.sites().exists());
    assert!(h.registry.list().unwrap().is_empty());
}

#[test]
fn registration_failure_rolls_back_files() {
    let h = Harness::new();
    h.registry.layout().ensure().unwrap();
    let guard = store::lock(&h.registry.layout().sentinel_path()).unwrap();
    let mut rng = StdRng::seed_from_u64(6);

    let err = h
        .orchestrator(&always_free)
        .create(h.options("locked-out"), &mut rng)
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::LockHeld);
    assert!(!h.sites().join("locked-out").exists());
    drop(guard);
    assert!(h.registry.list().unwrap().is_empty());
}

#[test]
fn cancelled_creation_leaves_nothing_behind() {
    let h = Harness::new();
    h.cancel.cancel();
    let mut rng = StdRng::seed_from_u64(7);

    let err = h
        .orchestrator(&always_free)
        .create(h.options("interrupted"), &mut rng)
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Cancelled);
    assert!(!h.sites().exists());
    assert!(h.registry.list().unwrap().is_empty());
}

#[test]
fn no_free_port_aborts_before_touching_disk() {
    let h = Harness::new();
    let mut rng = StdRng::seed_from_u64(8);
    let all_busy = |_: u16| false;

    let err = h
        .orchestrator(&all_busy)
        .create(h.options("crowded"), &mut rng)
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::NoAvailablePort);
    assert!(!h.sites().exists());
}

#[test]
fn delete_tears_down_then_removes_directory_and_entry() {
    let h = Harness::new();
    let mut rng = StdRng::seed_from_u64(9);
    h.orchestrator(&always_free)
        .create(h.options("doomed"), &mut rng)
        .unwrap();
    let dir = h.sites().join("doomed");

    let report = h.orchestrator(&always_free).delete("doomed").unwrap();

    assert!(report.directory_removed);
    assert!(report.warnings.is_empty());
    assert_eq!(*h.runtime.torn_down.borrow(), vec![dir.clone()]);
    assert!(!dir.exists());
    assert_eq!(
        h.registry.get("doomed").unwrap_err().kind(),
        ErrorKind::InstanceNotFound
    );
}

#[test]
fn delete_continues_when_teardown_fails() {
    let h = Harness::with_runtime(FakeRuntime {
        fail_teardown: true,
        ..FakeRuntime::default()
    });
    let mut rng = StdRng::seed_from_u64(10);
    h.orchestrator(&always_free)
        .create(h.options("stubborn"), &mut rng)
        .unwrap();

    let report = h.orchestrator(&always_free).delete("stubborn").unwrap();

    assert_eq!(report.warnings.len(), 1);
    assert!(report.directory_removed);
    assert!(h.registry.list().unwrap().is_empty());
}

#[test]
fn delete_with_missing_directory_only_unregisters() {
    let h = Harness::new();
    let mut rng = StdRng::seed_from_u64(11);
    h.orchestrator(&always_free)
        .create(h.options("vanished"), &mut rng)
        .unwrap();
    std::fs::remove_dir_all(h.sites().join("vanished")).unwrap();

    let report = h.orchestrator(&always_free).delete("vanished").unwrap();

    assert!(report.directory_missing);
    assert!(h.runtime.torn_down.borrow().is_empty());
    assert!(h.registry.list().unwrap().is_empty());
}

#[test]
fn delete_unknown_instance_fails() {
    let h = Harness::new();
    let err = h.orchestrator(&always_free).delete("ghost").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InstanceNotFound);
}
