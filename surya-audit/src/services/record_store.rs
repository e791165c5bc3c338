//! Site record store
//!
//! One pretty-printed JSON document per sample under the records directory.
//!
//! **Write contract:**
//! - `save` compares the record's `revision` with the persisted one and
//!   fails with `RevisionConflict` on mismatch (nothing is written)
//! - on success the revision is incremented, the record validated and sealed
//!   with a fresh integrity hash, written to a temp file and renamed
//! - the cache entry for the id is invalidated
//!
//! Every read verifies the integrity hash; a mismatch is a hard error.
//! Read-modify-write sequences go through [`RecordStore::update`] or
//! [`RecordStore::upsert`], which hold the per-id lock for the whole cycle.
//! Cache misses are filled under the same lock, so a read racing a save can
//! never re-insert the revision the save just invalidated.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};

use surya_common::{Error, Result, SiteRecord};
use tracing::{debug, info, warn};

/// Directory-backed record store with per-id write serialization
#[derive(Debug)]
pub struct RecordStore {
    dir: PathBuf,
    cache: RwLock<HashMap<String, SiteRecord>>,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl RecordStore {
    /// Open (and create if missing) a store rooted at `dir`
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        debug!(path = %dir.display(), "Record store opened");
        Ok(Self {
            dir,
            cache: RwLock::new(HashMap::new()),
            locks: Mutex::new(HashMap::new()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, sample_id: &str) -> Result<PathBuf> {
        validate_sample_id(sample_id)?;
        Ok(self.dir.join(format!("{}.json", sample_id)))
    }

    pub fn exists(&self, sample_id: &str) -> bool {
        self.path_for(sample_id).map(|p| p.exists()).unwrap_or(false)
    }

    /// Load a verified record
    pub fn load(&self, sample_id: &str) -> Result<SiteRecord> {
        self.try_load(sample_id)?
            .ok_or_else(|| Error::NotFound(format!("record {}", sample_id)))
    }

    /// Load a verified record, `None` if it was never saved
    pub fn try_load(&self, sample_id: &str) -> Result<Option<SiteRecord>> {
        if let Some(hit) = self.cached(sample_id)? {
            return Ok(Some(hit));
        }

        let lock = self.id_lock(sample_id)?;
        let _guard = lock
            .lock()
            .map_err(|_| Error::Internal("record lock poisoned".to_string()))?;

        // another reader may have filled it while we waited
        if let Some(hit) = self.cached(sample_id)? {
            return Ok(Some(hit));
        }

        let Some(record) = self.read_from_disk(sample_id)? else {
            return Ok(None);
        };

        self.cache
            .write()
            .map_err(|_| Error::Internal("record cache poisoned".to_string()))?
            .insert(sample_id.to_string(), record.clone());
        Ok(Some(record))
    }

    /// Compare-and-swap save
    ///
    /// `record.revision` must equal the persisted revision (0 for a new
    /// record). On success `record` holds the new revision and hash.
    pub fn save(&self, record: &mut SiteRecord) -> Result<()> {
        let lock = self.id_lock(&record.sample_id)?;
        let _guard = lock
            .lock()
            .map_err(|_| Error::Internal("record lock poisoned".to_string()))?;
        self.save_locked(record)
    }

    /// Load, mutate and save under the per-id lock
    pub fn update<F>(&self, sample_id: &str, mutate: F) -> Result<SiteRecord>
    where
        F: FnOnce(&mut SiteRecord) -> Result<()>,
    {
        let lock = self.id_lock(sample_id)?;
        let _guard = lock
            .lock()
            .map_err(|_| Error::Internal("record lock poisoned".to_string()))?;

        let mut record = self
            .read_from_disk(sample_id)?
            .ok_or_else(|| Error::NotFound(format!("record {}", sample_id)))?;
        mutate(&mut record)?;
        self.save_locked(&mut record)?;
        Ok(record)
    }

    /// Create or supersede a record under the per-id lock
    ///
    /// `build` receives the current record (if any) and returns the record to
    /// persist, or `None` to leave the stored one untouched. The returned
    /// record's revision must be left as received.
    pub fn upsert<F>(&self, sample_id: &str, build: F) -> Result<Option<SiteRecord>>
    where
        F: FnOnce(Option<SiteRecord>) -> Result<Option<SiteRecord>>,
    {
        let lock = self.id_lock(sample_id)?;
        let _guard = lock
            .lock()
            .map_err(|_| Error::Internal("record lock poisoned".to_string()))?;

        let current = self.read_from_disk(sample_id)?;
        let Some(mut record) = build(current)? else {
            return Ok(None);
        };
        if record.sample_id != sample_id {
            return Err(Error::InvalidInput(format!(
                "upsert for {} produced record {}",
                sample_id, record.sample_id
            )));
        }
        self.save_locked(&mut record)?;
        Ok(Some(record))
    }

    /// All readable records, review queue order; failures are logged and skipped
    pub fn list(&self) -> Result<Vec<SiteRecord>> {
        let (records, failures) = self.list_with_failures()?;
        for (sample_id, err) in &failures {
            warn!(sample_id = %sample_id, error = %err, "Skipping unreadable record");
        }
        Ok(records)
    }

    /// All records plus the ids that failed to load (integrity, parse or I/O)
    ///
    /// Records awaiting a human action come first, then by sample id.
    pub fn list_with_failures(&self) -> Result<(Vec<SiteRecord>, Vec<(String, Error)>)> {
        let mut ids = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                ids.push(stem.to_string());
            }
        }
        ids.sort();

        let mut records = Vec::with_capacity(ids.len());
        let mut failures = Vec::new();
        for id in ids {
            match self.load(&id) {
                Ok(record) => records.push(record),
                Err(e) => failures.push((id, e)),
            }
        }
        records.sort_by(|a, b| {
            (!a.qc_status.is_pending(), &a.sample_id).cmp(&(!b.qc_status.is_pending(), &b.sample_id))
        });
        Ok((records, failures))
    }

    /// Drop a cached entry so the next read goes to disk
    pub fn invalidate(&self, sample_id: &str) -> Result<()> {
        self.cache
            .write()
            .map_err(|_| Error::Internal("record cache poisoned".to_string()))?
            .remove(sample_id);
        Ok(())
    }

    fn cached(&self, sample_id: &str) -> Result<Option<SiteRecord>> {
        Ok(self
            .cache
            .read()
            .map_err(|_| Error::Internal("record cache poisoned".to_string()))?
            .get(sample_id)
            .cloned())
    }

    fn id_lock(&self, sample_id: &str) -> Result<Arc<Mutex<()>>> {
        validate_sample_id(sample_id)?;
        let mut locks = self
            .locks
            .lock()
            .map_err(|_| Error::Internal("lock table poisoned".to_string()))?;
        Ok(locks
            .entry(sample_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone())
    }

    fn read_from_disk(&self, sample_id: &str) -> Result<Option<SiteRecord>> {
        let path = self.path_for(sample_id)?;
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let record: SiteRecord = serde_json::from_str(&content)?;
        if record.sample_id != sample_id {
            return Err(Error::Invariant(format!(
                "{} contains record for {}",
                path.display(),
                record.sample_id
            )));
        }
        if let Err(e) = record.verify_integrity() {
            warn!(sample_id = %sample_id, "Integrity check failed on load");
            return Err(e);
        }
        Ok(Some(record))
    }

    /// Caller holds the id lock
    fn save_locked(&self, record: &mut SiteRecord) -> Result<()> {
        let path = self.path_for(&record.sample_id)?;

        let persisted = self
            .read_from_disk(&record.sample_id)?
            .map(|r| r.revision)
            .unwrap_or(0);
        if persisted != record.revision {
            return Err(Error::RevisionConflict {
                sample_id: record.sample_id.clone(),
                expected: record.revision,
                found: persisted,
            });
        }

        let mut next = record.clone();
        next.revision = persisted + 1;
        next.validate()?;
        next.seal()?;

        let body = serde_json::to_string_pretty(&next)?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, body)?;
        fs::rename(&tmp, &path)?;

        self.invalidate(&next.sample_id)?;
        info!(
            sample_id = %next.sample_id,
            revision = next.revision,
            status = %next.qc_status,
            "Record saved"
        );

        *record = next;
        Ok(())
    }
}

/// Sample ids double as file stems: ASCII alphanumerics, `-`, `_` and `.`,
/// not starting with `.`
pub fn validate_sample_id(sample_id: &str) -> Result<()> {
    let valid = !sample_id.is_empty()
        && sample_id.len() <= 128
        && !sample_id.starts_with('.')
        && sample_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if valid {
        Ok(())
    } else {
        Err(Error::InvalidInput(format!(
            "invalid sample id {:?}",
            sample_id
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use surya_common::{BufferZone, QcStatus};

    fn store() -> (tempfile::TempDir, RecordStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = RecordStore::open(dir.path().join("records")).unwrap();
        (dir, store)
    }

    fn record(id: &str) -> SiteRecord {
        let mut rec = SiteRecord::new(id, 12.97, 77.59);
        rec.qc_status = QcStatus::Verifiable;
        rec.push_note("Clear View: Empty Roof");
        rec
    }

    #[test]
    fn test_first_save_sets_revision_and_hash() {
        let (_dir, store) = store();
        let mut rec = record("S1");
        store.save(&mut rec).unwrap();

        assert_eq!(rec.revision, 1);
        assert_eq!(rec.integrity_hash.len(), 64);
        assert!(store.exists("S1"));
    }

    #[test]
    fn test_round_trip_preserves_hash() {
        let (_dir, store) = store();
        let mut rec = record("S1");
        store.save(&mut rec).unwrap();

        store.invalidate("S1").unwrap();
        let loaded = store.load("S1").unwrap();
        assert_eq!(loaded, rec);
        assert_eq!(loaded.integrity_hash, rec.integrity_hash);
    }

    #[test]
    fn test_resave_changes_hash() {
        let (_dir, store) = store();
        let mut rec = record("S1");
        store.save(&mut rec).unwrap();
        let first = rec.integrity_hash.clone();

        rec.push_note("Re-opened by Auditor");
        rec.qc_status = QcStatus::NotVerifiable;
        store.save(&mut rec).unwrap();

        assert_eq!(rec.revision, 2);
        assert_ne!(rec.integrity_hash, first);
    }

    #[test]
    fn test_stale_revision_conflicts() {
        let (_dir, store) = store();
        let mut rec = record("S1");
        store.save(&mut rec).unwrap();

        let mut auditor_copy = store.load("S1").unwrap();
        let mut citizen_copy = store.load("S1").unwrap();

        auditor_copy.push_note("Flagged by Auditor");
        store.save(&mut auditor_copy).unwrap();

        citizen_copy.push_note("Citizen Initiated Appeal");
        match store.save(&mut citizen_copy) {
            Err(Error::RevisionConflict {
                expected, found, ..
            }) => {
                assert_eq!(expected, 1);
                assert_eq!(found, 2);
            }
            other => panic!("expected conflict, got {:?}", other),
        }

        // loser's change not written
        let current = store.load("S1").unwrap();
        assert_eq!(current.qc_notes.last().unwrap(), "Flagged by Auditor");
    }

    #[test]
    fn test_new_record_over_existing_conflicts() {
        let (_dir, store) = store();
        store.save(&mut record("S1")).unwrap();
        assert!(matches!(
            store.save(&mut record("S1")),
            Err(Error::RevisionConflict { .. })
        ));
    }

    #[test]
    fn test_tampered_file_fails_load() {
        let (_dir, store) = store();
        let mut rec = record("S1");
        store.save(&mut rec).unwrap();

        let path = store.path_for("S1").unwrap();
        let text = fs::read_to_string(&path).unwrap();
        fs::write(&path, text.replace("\"has_solar\": false", "\"has_solar\": true")).unwrap();
        store.invalidate("S1").unwrap();

        assert!(matches!(store.load("S1"), Err(Error::Integrity { .. })));
    }

    #[test]
    fn test_invariant_violation_not_written() {
        let (_dir, store) = store();
        let mut rec = record("S1");
        rec.has_solar = true;
        rec.buffer_zone = BufferZone::None;
        assert!(matches!(store.save(&mut rec), Err(Error::Invariant(_))));
        assert!(!store.exists("S1"));
    }

    #[test]
    fn test_update_applies_mutation() {
        let (_dir, store) = store();
        store.save(&mut record("S1")).unwrap();

        let updated = store
            .update("S1", |r| {
                r.push_note("Flagged by Auditor");
                Ok(())
            })
            .unwrap();
        assert_eq!(updated.revision, 2);
        assert_eq!(store.load("S1").unwrap().qc_notes.len(), 2);
    }

    #[test]
    fn test_update_error_leaves_record() {
        let (_dir, store) = store();
        store.save(&mut record("S1")).unwrap();

        let result = store.update("S1", |_| Err(Error::InvalidTransition("nope".into())));
        assert!(result.is_err());
        assert_eq!(store.load("S1").unwrap().revision, 1);
    }

    #[test]
    fn test_update_missing_is_not_found() {
        let (_dir, store) = store();
        assert!(matches!(
            store.update("nope", |_| Ok(())),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn test_upsert_creates_then_supersedes() {
        let (_dir, store) = store();
        let created = store
            .upsert("S1", |current| {
                assert!(current.is_none());
                Ok(Some(record("S1")))
            })
            .unwrap()
            .unwrap();
        assert_eq!(created.revision, 1);

        let superseded = store
            .upsert("S1", |current| {
                let mut rec = current.unwrap();
                rec.push_note("Noise Ignored (Weak Signal)");
                Ok(Some(rec))
            })
            .unwrap()
            .unwrap();
        assert_eq!(superseded.revision, 2);
        assert_eq!(superseded.qc_notes.len(), 2);
    }

    #[test]
    fn test_upsert_can_decline_to_write() {
        let (_dir, store) = store();
        store.save(&mut record("S1")).unwrap();

        let written = store.upsert("S1", |_| Ok(None)).unwrap();
        assert!(written.is_none());
        assert_eq!(store.load("S1").unwrap().revision, 1);
    }

    #[test]
    fn test_reads_racing_writes_never_serve_stale_revision() {
        use std::sync::atomic::{AtomicBool, Ordering};

        let (_dir, store) = store();
        let store = Arc::new(store);
        store.save(&mut record("S1")).unwrap();

        let stop = Arc::new(AtomicBool::new(false));
        let readers: Vec<_> = (0..4)
            .map(|_| {
                let store = Arc::clone(&store);
                let stop = Arc::clone(&stop);
                std::thread::spawn(move || {
                    while !stop.load(Ordering::Relaxed) {
                        store.load("S1").unwrap();
                    }
                })
            })
            .collect();

        for i in 0..40u64 {
            store
                .update("S1", |r| {
                    r.push_note(format!("note {}", i));
                    Ok(())
                })
                .unwrap();
            // a save is visible to every read that starts after it returns
            assert_eq!(store.load("S1").unwrap().revision, i + 2);
        }

        stop.store(true, Ordering::Relaxed);
        for reader in readers {
            reader.join().unwrap();
        }
        assert_eq!(store.load("S1").unwrap().revision, 41);
    }

    #[test]
    fn test_list_sorted_and_reports_failures() {
        let (_dir, store) = store();
        store.save(&mut record("B")).unwrap();
        store.save(&mut record("A")).unwrap();
        store.save(&mut record("C")).unwrap();

        let path = store.path_for("C").unwrap();
        let text = fs::read_to_string(&path).unwrap();
        fs::write(&path, text.replace("12.97", "13.5")).unwrap();
        store.invalidate("C").unwrap();

        let (records, failures) = store.list_with_failures().unwrap();
        let ids: Vec<_> = records.iter().map(|r| r.sample_id.as_str()).collect();
        assert_eq!(ids, vec!["A", "B"]);
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].0, "C");

        assert_eq!(store.list().unwrap().len(), 2);
    }

    #[test]
    fn test_list_puts_pending_reviews_first() {
        let (_dir, store) = store();
        store.save(&mut record("A")).unwrap();
        let mut appeal = record("C");
        appeal.qc_status = QcStatus::PendingCitizenAppeal;
        store.save(&mut appeal).unwrap();
        let mut flagged = record("D");
        flagged.qc_status = QcStatus::PendingAuditorFlag;
        store.save(&mut flagged).unwrap();
        let mut open = record("B");
        open.qc_status = QcStatus::NotVerifiable;
        store.save(&mut open).unwrap();

        let ids: Vec<_> = store
            .list()
            .unwrap()
            .into_iter()
            .map(|r| r.sample_id)
            .collect();
        assert_eq!(ids, vec!["C", "D", "A", "B"]);
    }

    #[test]
    fn test_rejects_path_like_ids() {
        assert!(validate_sample_id("../etc/passwd").is_err());
        assert!(validate_sample_id("a/b").is_err());
        assert!(validate_sample_id("").is_err());
        assert!(validate_sample_id(".hidden").is_err());
        assert!(validate_sample_id("KA-01_2024.3").is_ok());
    }
}
