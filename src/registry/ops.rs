//! Typed operations over the central registry file.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use super::types::{InstanceRecord, InstanceStatus, RegistryMap};
use crate::error::{AppError, Result};
use crate::paths::StorageLayout;
use crate::store::{self, Format, Loaded};

/// Handle to the registry stored under a [`StorageLayout`].
///
/// Nothing is cached: every call reads the file fresh, and every mutation runs
/// as one locked read-modify-write via [`Registry::transact`].
#[derive(Debug, Clone)]
pub struct Registry {
    layout: StorageLayout,
}

/// A reason a registration would clobber an existing entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Conflict {
    /// The name is taken; the existing entry points at `directory`.
    Name { directory: PathBuf },
    /// The directory is already registered under `name`.
    Directory { name: String },
}

impl Conflict {
    pub fn into_error(self, name: &str, directory: &Path) -> AppError {
        match self {
            Self::Name { directory } => AppError::name_conflict(name, &directory),
            Self::Directory { name } => AppError::directory_conflict(directory, &name),
        }
    }
}

impl Registry {
    pub fn new(layout: StorageLayout) -> Self {
        Self { layout }
    }

    pub fn layout(&self) -> &StorageLayout {
        &self.layout
    }

    pub fn path(&self) -> PathBuf {
        self.layout.registry_path()
    }

    /// Lenient read with the corruption report kept.
    pub fn load(&self) -> Result<Loaded<RegistryMap>> {
        store::load(&self.path(), Format::Json)
    }

    /// Full mapping for presentation. A corrupt file reads as empty.
    pub fn list(&self) -> Result<RegistryMap> {
        self.load().map(|loaded| loaded.value)
    }

    /// Read that fails with `CorruptState` instead of degrading.
    pub fn list_strict(&self) -> Result<RegistryMap> {
        store::read_strict(&self.path(), Format::Json)
    }

    pub fn get(&self, name: &str) -> Result<InstanceRecord> {
        self.list()?
            .remove(name)
            .ok_or_else(|| AppError::instance_not_found(name))
    }

    pub fn locate(&self, name: &str) -> Result<PathBuf> {
        self.get(name).map(|record| record.directory)
    }

    /// Run `f` against the current mapping while holding the sentinel, then
    /// persist the result atomically.
    ///
    /// If `f` fails nothing is written. If the mapping is unchanged the file is
    /// left alone, even when it failed to parse. A file that failed to parse is
    /// copied aside with [`store::preserve_corrupt`] before it is replaced.
    pub fn transact<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut RegistryMap) -> Result<T>,
    {
        self.layout.ensure()?;
        let path = self.path();
        store::with_lock(&self.layout.sentinel_path(), || {
            let Loaded { value, corrupt } = store::load::<RegistryMap>(&path, Format::Json)?;
            let mut map = value.clone();
            let result = f(&mut map)?;

            if map == value {
                return Ok(result);
            }
            if corrupt.is_some() {
                let backup = store::preserve_corrupt(&path)?;
                log::warn!(
                    "Registry {} was unreadable, previous contents saved to {}",
                    path.display(),
                    backup.display()
                );
            }
            store::write_atomic(&path, Format::Json, &map)?;
            Ok(result)
        })
    }

    /// Conflicts `name`/`directory` would hit against the current file.
    /// Used to decide whether to prompt before calling [`Registry::register`].
    pub fn conflicts(&self, name: &str, directory: &Path) -> Result<Vec<Conflict>> {
        Ok(find_conflicts(&self.list()?, name, directory))
    }

    /// Add `record` under `name`.
    ///
    /// Conflicts found inside the transaction are rejected unless they appear
    /// in `confirmed`. A confirmed name conflict replaces the old entry
    /// wholesale; a confirmed directory conflict drops the other name.
    /// Returns the names whose entries were replaced or dropped.
    pub fn register(
        &self,
        name: &str,
        record: InstanceRecord,
        confirmed: &[Conflict],
    ) -> Result<Vec<String>> {
        self.transact(|map| {
            let conflicts = find_conflicts(map, name, &record.directory);
            if let Some(unconfirmed) = conflicts.iter().find(|c| !confirmed.contains(c)) {
                return Err(unconfirmed.clone().into_error(name, &record.directory));
            }

            let mut replaced = Vec::new();
            for conflict in conflicts {
                match conflict {
                    Conflict::Name { .. } => replaced.push(name.to_string()),
                    Conflict::Directory { name: other } => {
                        map.remove(&other);
                        replaced.push(other);
                    }
                }
            }
            map.insert(name.to_string(), record);
            Ok(replaced)
        })
    }

    /// Remove the entry only. The instance directory is not touched.
    pub fn unregister(&self, name: &str) -> Result<InstanceRecord> {
        self.transact(|map| {
            map.remove(name)
                .ok_or_else(|| AppError::instance_not_found(name))
        })
    }

    /// Entries whose directory no longer exists.
    pub fn prune_candidates(&self) -> Result<RegistryMap> {
        Ok(self
            .list()?
            .into_iter()
            .filter(|(_, record)| !record.directory.exists())
            .collect())
    }

    /// Remove the confirmed candidates in one write. A candidate whose
    /// directory reappeared since it was listed is kept. Returns removed names.
    pub fn prune(&self, confirmed: &BTreeSet<String>) -> Result<Vec<String>> {
        self.transact(|map| {
            let doomed: Vec<String> = map
                .iter()
                .filter(|(name, record)| confirmed.contains(*name) && !record.directory.exists())
                .map(|(name, _)| name.clone())
                .collect();
            for name in &doomed {
                map.remove(name);
            }
            Ok(doomed)
        })
    }

    /// Set only the status of `name`.
    pub fn refresh_status(&self, name: &str, status: InstanceStatus) -> Result<()> {
        self.transact(|map| {
            let record = map
                .get_mut(name)
                .ok_or_else(|| AppError::instance_not_found(name))?;
            record.status = status;
            Ok(())
        })
    }

    /// Apply a batch of scanned statuses in one write. Names that vanished
    /// since the scan are skipped. Returns the names whose status changed.
    pub fn apply_statuses(
        &self,
        statuses: &BTreeMap<String, InstanceStatus>,
    ) -> Result<Vec<String>> {
        self.transact(|map| {
            let mut changed = Vec::new();
            for (name, status) in statuses {
                if let Some(record) = map.get_mut(name) {
                    if record.status != *status {
                        record.status = *status;
                        changed.push(name.clone());
                    }
                }
            }
            Ok(changed)
        })
    }

    /// Update only the version fields that are given.
    pub fn record_versions(
        &self,
        name: &str,
        software: Option<&str>,
        database: Option<&str>,
    ) -> Result<InstanceRecord> {
        self.transact(|map| {
            let record = map
                .get_mut(name)
                .ok_or_else(|| AppError::instance_not_found(name))?;
            if let Some(software) = software {
                record.software_version = software.to_string();
            }
            if let Some(database) = database {
                record.database_version = database.to_string();
            }
            Ok(record.clone())
        })
    }
}

/// Name of the entry registered for `directory`, if any.
pub fn find_by_directory<'a>(map: &'a RegistryMap, directory: &Path) -> Option<&'a str> {
    map.iter()
        .find(|(_, record)| same_directory(&record.directory, directory))
        .map(|(name, _)| name.as_str())
}

fn find_conflicts(map: &RegistryMap, name: &str, directory: &Path) -> Vec<Conflict> {
    let mut conflicts = Vec::new();
    if let Some(existing) = map.get(name) {
        conflicts.push(Conflict::Name {
            directory: existing.directory.clone(),
        });
    }
    conflicts.extend(
        map.iter()
            .filter(|(other, record)| {
                other.as_str() != name && same_directory(&record.directory, directory)
            })
            .map(|(other, _)| Conflict::Directory {
                name: other.clone(),
            }),
    );
    conflicts
}

fn same_directory(a: &Path, b: &Path) -> bool {
    if a == b {
        return true;
    }
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use tempfile::TempDir;

    fn record(dir: &Path, port: u16) -> InstanceRecord {
        InstanceRecord {
            directory: dir.to_path_buf(),
            creation_timestamp: "2026-01-02 03:04:05".to_string(),
            software_version: "6.5".to_string(),
            database_version: "11.4".to_string(),
            assigned_port: Some(port),
            status: InstanceStatus::Stopped,
        }
    }

    fn setup() -> (TempDir, Registry) {
        let temp = TempDir::new().unwrap();
        let registry = Registry::new(StorageLayout::at(temp.path().join("data")));
        (temp, registry)
    }

    #[test]
    fn empty_registry_lists_nothing() {
        let (_temp, registry) = setup();
        assert!(registry.list().unwrap().is_empty());
        assert_eq!(
            registry.get("ghost").unwrap_err().kind(),
            ErrorKind::InstanceNotFound
        );
    }

    #[test]
    fn empty_object_is_empty_registry() {
        let (_temp, registry) = setup();
        registry.layout().ensure().unwrap();
        std::fs::write(registry.path(), "{}").unwrap();
        assert!(registry.list_strict().unwrap().is_empty());
    }

    #[test]
    fn register_round_trips_record() {
        let (temp, registry) = setup();
        let rec = record(&temp.path().join("a"), 11001);

        registry.register("a", rec.clone(), &[]).unwrap();

        assert_eq!(registry.get("a").unwrap(), rec);
        assert_eq!(registry.locate("a").unwrap(), temp.path().join("a"));
        assert!(!registry.layout().sentinel_path().exists());
    }

    #[test]
    fn register_rejects_name_and_directory_conflicts() {
        let (temp, registry) = setup();
        registry
            .register("a", record(&temp.path().join("a"), 11001), &[])
            .unwrap();

        let err = registry
            .register("a", record(&temp.path().join("other"), 11002), &[])
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NameConflict);

        let err = registry
            .register("b", record(&temp.path().join("a"), 11003), &[])
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DirectoryConflict);
        assert_eq!(err.payload("registered_as"), Some("a"));

        assert_eq!(registry.list().unwrap().len(), 1);
    }

    #[test]
    fn overwrite_replaces_entry_without_merging() {
        let (temp, registry) = setup();
        registry
            .register("a", record(&temp.path().join("a"), 11001), &[])
            .unwrap();

        let replacement = InstanceRecord::new(temp.path().join("a2"), None);
        let confirmed = registry
            .conflicts("a", &replacement.directory)
            .unwrap();
        let replaced = registry
            .register("a", replacement.clone(), &confirmed)
            .unwrap();

        assert_eq!(replaced, vec!["a".to_string()]);
        assert_eq!(registry.get("a").unwrap(), replacement);
    }

    #[test]
    fn overwrite_drops_other_name_for_same_directory() {
        let (temp, registry) = setup();
        let dir = temp.path().join("shared");
        registry.register("old", record(&dir, 11001), &[]).unwrap();

        let confirmed = registry.conflicts("new", &dir).unwrap();
        assert_eq!(
            confirmed,
            vec![Conflict::Directory {
                name: "old".to_string()
            }]
        );
        let replaced = registry
            .register("new", record(&dir, 11001), &confirmed)
            .unwrap();

        assert_eq!(replaced, vec!["old".to_string()]);
        let map = registry.list().unwrap();
        assert_eq!(map.keys().collect::<Vec<_>>(), vec!["new"]);
    }

    #[test]
    fn conflict_appearing_after_confirmation_is_rejected() {
        let (temp, registry) = setup();
        let dir = temp.path().join("shared");
        registry
            .register("a", record(&temp.path().join("a"), 11001), &[])
            .unwrap();
        let confirmed = registry.conflicts("a", &dir).unwrap();

        // Another invocation registers the directory before we commit.
        registry.register("b", record(&dir, 11002), &[]).unwrap();

        let err = registry
            .register("a", record(&dir, 11003), &confirmed)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DirectoryConflict);
        let map = registry.list().unwrap();
        assert_eq!(map["a"].assigned_port, Some(11001));
        assert_eq!(map["b"].assigned_port, Some(11002));
    }

    #[test]
    fn confirmed_name_conflict_for_moved_entry_is_rejected() {
        let (temp, registry) = setup();
        registry
            .register("a", record(&temp.path().join("a"), 11001), &[])
            .unwrap();
        let confirmed = registry.conflicts("a", &temp.path().join("new")).unwrap();

        registry.unregister("a").unwrap();
        registry
            .register("a", record(&temp.path().join("moved"), 11002), &[])
            .unwrap();

        let err = registry
            .register("a", record(&temp.path().join("new"), 11003), &confirmed)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NameConflict);
        assert_eq!(registry.get("a").unwrap().assigned_port, Some(11002));
    }

    #[test]
    fn unregister_leaves_directory_alone() {
        let (temp, registry) = setup();
        let dir = temp.path().join("keep");
        std::fs::create_dir(&dir).unwrap();
        registry.register("keep", record(&dir, 11001), &[]).unwrap();

        registry.unregister("keep").unwrap();

        assert!(dir.is_dir());
        assert!(registry.list().unwrap().is_empty());
        assert_eq!(
            registry.unregister("keep").unwrap_err().kind(),
            ErrorKind::InstanceNotFound
        );
    }

    #[test]
    fn prune_removes_exactly_missing_entries() {
        let (temp, registry) = setup();
        let a = temp.path().join("a");
        let c = temp.path().join("c");
        std::fs::create_dir(&a).unwrap();
        std::fs::create_dir(&c).unwrap();
        registry.register("a", record(&a, 11001), &[]).unwrap();
        registry
            .register("b", record(&temp.path().join("b"), 11002), &[])
            .unwrap();
        registry.register("c", record(&c, 11003), &[]).unwrap();
        let before = registry.list().unwrap();

        let candidates = registry.prune_candidates().unwrap();
        assert_eq!(candidates.keys().collect::<Vec<_>>(), vec!["b"]);

        let confirmed: BTreeSet<String> = candidates.into_keys().collect();
        assert_eq!(registry.prune(&confirmed).unwrap(), vec!["b".to_string()]);

        let after = registry.list().unwrap();
        assert_eq!(after.len(), 2);
        assert_eq!(after["a"], before["a"]);
        assert_eq!(after["c"], before["c"]);
    }

    #[test]
    fn prune_keeps_entry_whose_directory_came_back() {
        let (temp, registry) = setup();
        let dir = temp.path().join("back");
        registry.register("back", record(&dir, 11001), &[]).unwrap();
        let confirmed: BTreeSet<String> = registry.prune_candidates().unwrap().into_keys().collect();

        std::fs::create_dir(&dir).unwrap();

        assert!(registry.prune(&confirmed).unwrap().is_empty());
        assert!(registry.get("back").is_ok());
    }

    #[test]
    fn refresh_status_touches_only_status() {
        let (temp, registry) = setup();
        let rec = record(&temp.path().join("a"), 11001);
        registry.register("a", rec.clone(), &[]).unwrap();

        registry
            .refresh_status("a", InstanceStatus::Running)
            .unwrap();

        let updated = registry.get("a").unwrap();
        assert_eq!(updated.status, InstanceStatus::Running);
        assert_eq!(
            InstanceRecord {
                status: rec.status,
                ..updated
            },
            rec
        );
    }

    #[test]
    fn apply_statuses_reports_changes_and_skips_vanished() {
        let (temp, registry) = setup();
        registry
            .register("a", record(&temp.path().join("a"), 11001), &[])
            .unwrap();
        registry
            .register("b", record(&temp.path().join("b"), 11002), &[])
            .unwrap();

        let statuses = BTreeMap::from([
            ("a".to_string(), InstanceStatus::Stopped),
            ("b".to_string(), InstanceStatus::DirectoryMissing),
            ("gone".to_string(), InstanceStatus::Running),
        ]);
        let changed = registry.apply_statuses(&statuses).unwrap();

        assert_eq!(changed, vec!["b".to_string()]);
        assert!(!registry.list().unwrap().contains_key("gone"));
    }

    #[test]
    fn record_versions_updates_given_fields() {
        let (temp, registry) = setup();
        registry
            .register("a", record(&temp.path().join("a"), 11001), &[])
            .unwrap();

        let updated = registry.record_versions("a", Some("6.6"), None).unwrap();

        assert_eq!(updated.software_version, "6.6");
        assert_eq!(updated.database_version, "11.4");
    }

    #[test]
    fn failed_transaction_writes_nothing() {
        let (temp, registry) = setup();
        registry
            .register("a", record(&temp.path().join("a"), 11001), &[])
            .unwrap();
        let before = std::fs::read(registry.path()).unwrap();

        let result: Result<()> = registry.transact(|map| {
            map.clear();
            Err(AppError::cancelled("declined"))
        });

        assert!(result.is_err());
        assert_eq!(std::fs::read(registry.path()).unwrap(), before);
        assert!(!registry.layout().sentinel_path().exists());
    }

    #[test]
    fn held_sentinel_blocks_mutation() {
        let (temp, registry) = setup();
        registry.layout().ensure().unwrap();
        let _guard = store::lock(&registry.layout().sentinel_path()).unwrap();

        let err = registry
            .register("a", record(&temp.path().join("a"), 11001), &[])
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::LockHeld);
        assert!(!registry.path().exists());
    }

    #[test]
    fn corrupt_registry_is_preserved_before_overwrite() {
        let (temp, registry) = setup();
        registry.layout().ensure().unwrap();
        std::fs::write(registry.path(), "{ \"a\": ").unwrap();

        assert!(registry.list().unwrap().is_empty());
        assert_eq!(
            registry.list_strict().unwrap_err().kind(),
            ErrorKind::CorruptState
        );

        registry
            .register("b", record(&temp.path().join("b"), 11002), &[])
            .unwrap();

        let backup = temp.path().join("data").join("instances.json.corrupt");
        assert_eq!(std::fs::read_to_string(backup).unwrap(), "{ \"a\": ");
        assert_eq!(registry.list_strict().unwrap().len(), 1);
    }

    #[test]
    fn unchanged_transaction_leaves_corrupt_registry_alone() {
        let (_temp, registry) = setup();
        registry.layout().ensure().unwrap();
        std::fs::write(registry.path(), "{ \"a\": ").unwrap();

        let changed = registry.apply_statuses(&BTreeMap::new()).unwrap();

        assert!(changed.is_empty());
        assert_eq!(std::fs::read_to_string(registry.path()).unwrap(), "{ \"a\": ");
        assert!(!registry.path().with_file_name("instances.json.corrupt").exists());
    }

    #[test]
    fn repeated_corruption_keeps_every_backup() {
        let (temp, registry) = setup();
        registry.layout().ensure().unwrap();
        std::fs::write(registry.path(), "first broken edit").unwrap();
        registry
            .register("a", record(&temp.path().join("a"), 11001), &[])
            .unwrap();

        std::fs::write(registry.path(), "second broken edit").unwrap();
        registry
            .register("b", record(&temp.path().join("b"), 11002), &[])
            .unwrap();

        let mut backups: Vec<String> = std::fs::read_dir(temp.path().join("data"))
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().contains(".corrupt"))
            .map(|e| std::fs::read_to_string(e.path()).unwrap())
            .collect();
        backups.sort();
        assert_eq!(backups, vec!["first broken edit", "second broken edit"]);
    }

    #[test]
    fn find_by_directory_matches_registered_path() {
        let (temp, registry) = setup();
        let dir = temp.path().join("a");
        registry.register("a", record(&dir, 11001), &[]).unwrap();

        let map = registry.list().unwrap();
        assert_eq!(find_by_directory(&map, &dir), Some("a"));
        assert_eq!(find_by_directory(&map, &temp.path().join("z")), None);
    }
}
