// Member record store: validated CRUD over an owned collection

use crate::error::StoreError;
use crate::field::FieldSet;
use crate::record::{FieldValue, Payload, Record, payload};
use crate::storage::{STORAGE_KEY, Snapshot, Storage};
use crate::validate::{self, Violations};
use std::collections::HashSet;
use tracing::{debug, error, info, warn};

/// Store construction options
#[derive(Debug, Clone)]
pub struct StoreOptions {
    /// Key the snapshot is read from and written to
    pub storage_key: String,
    /// Only commit a mutation in memory once its snapshot is written
    pub strict_persistence: bool,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            storage_key: STORAGE_KEY.to_string(),
            strict_persistence: false,
        }
    }
}

/// Owns the authoritative record collection and its storage backend
pub struct Store {
    fields: FieldSet,
    records: Vec<Record>,
    storage: Option<Box<dyn Storage>>,
    options: StoreOptions,
    revision: u64,
    persistence_error: Option<String>,
}

impl Store {
    /// Open a store, loading the previous snapshot from `storage`
    ///
    /// A missing, unreadable or malformed snapshot falls back to the default
    /// records that satisfy `fields`. Without storage the store runs in memory
    /// only.
    pub fn open(fields: FieldSet, storage: Option<Box<dyn Storage>>, options: StoreOptions) -> Self {
        let loaded = storage
            .as_ref()
            .and_then(|storage| load_snapshot(&**storage, &options.storage_key, &fields));
        let records = match loaded {
            Some(records) => records,
            None => admit(seed_records(&fields).into_iter().map(Ok), &fields),
        };

        info!(
            count = records.len(),
            persistent = storage.is_some(),
            key = %options.storage_key,
            "Opened member store"
        );

        Self {
            fields,
            records,
            storage,
            options,
            revision: 0,
            persistence_error: None,
        }
    }

    /// In-memory store over the default records
    pub fn in_memory(fields: FieldSet) -> Self {
        Self::open(fields, None, StoreOptions::default())
    }

    pub fn fields(&self) -> &FieldSet {
        &self.fields
    }

    /// Swap the schema; existing records are kept as they are
    pub fn replace_fields(&mut self, fields: FieldSet) {
        debug!(count = fields.len(), "Replacing field set");
        self.fields = fields;
        self.revision += 1;
    }

    /// Copy of the collection in insertion order
    pub fn list(&self) -> Vec<Record> {
        self.records.clone()
    }

    /// Borrowed view of the collection, for derived views
    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn get(&self, id: &str) -> Option<&Record> {
        self.records.iter().find(|r| r.id == id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Bumped on every committed mutation
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Last snapshot write failure, cleared by the next successful write
    pub fn persistence_error(&self) -> Option<&str> {
        self.persistence_error.as_deref()
    }

    pub fn is_persistent(&self) -> bool {
        self.storage.is_some()
    }

    /// Check a payload against the field set without touching the store
    pub fn validate(&self, candidate: &Payload) -> Result<(), Violations> {
        let cleaned = self.known_fields(candidate.clone());
        validate::validate_record(&self.fields, &cleaned)
    }

    /// Validate and append a new record under a fresh id
    pub fn add(&mut self, candidate: Payload) -> Result<Record, StoreError> {
        let values = self.known_fields(candidate);
        validate::validate_record(&self.fields, &values).map_err(StoreError::Validation)?;

        let record = Record::new(uuid::Uuid::new_v4().to_string(), values);

        let mut next = self.records.clone();
        next.push(record.clone());
        self.commit(next)?;

        info!(id = %record.id, "Added record");
        Ok(record)
    }

    /// Shallow-merge `patch` onto an existing record and re-validate
    pub fn update(&mut self, id: &str, patch: Payload) -> Result<Record, StoreError> {
        let index = self.position(id)?;

        let mut merged = self.records[index].clone();
        merged.merge(self.known_fields(patch));
        validate::validate_record(&self.fields, &merged.values).map_err(StoreError::Validation)?;

        let mut next = self.records.clone();
        next[index] = merged.clone();
        self.commit(next)?;

        info!(id, "Updated record");
        Ok(merged)
    }

    pub fn delete(&mut self, id: &str) -> Result<(), StoreError> {
        let index = self.position(id)?;

        let mut next = self.records.clone();
        next.remove(index);
        self.commit(next)?;

        info!(id, "Deleted record");
        Ok(())
    }

    /// Remove every record whose id is listed; unknown ids are ignored
    ///
    /// Returns the number of records removed.
    pub fn delete_many<S: AsRef<str>>(&mut self, ids: &[S]) -> Result<usize, StoreError> {
        let ids: HashSet<&str> = ids.iter().map(|s| s.as_ref()).collect();

        let next: Vec<Record> = self
            .records
            .iter()
            .filter(|r| !ids.contains(r.id.as_str()))
            .cloned()
            .collect();
        let removed = self.records.len() - next.len();

        if removed == 0 {
            debug!(requested = ids.len(), "delete_many: nothing to remove");
            return Ok(0);
        }

        self.commit(next)?;
        info!(removed, requested = ids.len(), "Deleted records");
        Ok(removed)
    }

    // ========================================================================
    // Helper methods
    // ========================================================================

    fn position(&self, id: &str) -> Result<usize, StoreError> {
        self.records
            .iter()
            .position(|r| r.id == id)
            .ok_or_else(|| StoreError::NotFound { id: id.to_string() })
    }

    /// Drop `id` and keys that are not field ids
    fn known_fields(&self, mut values: Payload) -> Payload {
        values.retain(|key, _| {
            let known = self.fields.contains(key);
            if !known {
                debug!(key = %key, "Dropping unknown attribute");
            }
            known
        });
        values
    }

    /// Persist `next` and make it the current collection
    fn commit(&mut self, next: Vec<Record>) -> Result<(), StoreError> {
        if let Some(storage) = self.storage.as_mut() {
            let written = Snapshot::new(next.clone())
                .to_json()
                .and_then(|json| storage.write(&self.options.storage_key, &json));

            match written {
                Ok(()) => self.persistence_error = None,
                Err(e) if self.options.strict_persistence => {
                    error!(error = %format!("{:#}", e), "Snapshot write failed, mutation discarded");
                    return Err(StoreError::Persistence(e));
                }
                Err(e) => {
                    error!(error = %format!("{:#}", e), "Snapshot write failed, keeping in-memory change");
                    self.persistence_error = Some(format!("{:#}", e));
                }
            }
        }

        self.records = next;
        self.revision += 1;
        Ok(())
    }
}

/// Records from the stored snapshot, `None` when there is none to use
fn load_snapshot(storage: &dyn Storage, key: &str, fields: &FieldSet) -> Option<Vec<Record>> {
    let json = match storage.read(key) {
        Ok(Some(json)) => json,
        Ok(None) => {
            debug!(key, "No snapshot found, using default records");
            return None;
        }
        Err(e) => {
            warn!(key, error = %format!("{:#}", e), "Failed to read snapshot, using default records");
            return None;
        }
    };

    let members = match Snapshot::parse_members(&json) {
        Ok(members) => members,
        Err(e) => {
            warn!(key, error = %format!("{:#}", e), "Failed to parse snapshot, using default records");
            return None;
        }
    };

    let records = admit(members, fields);
    debug!(key, count = records.len(), "Loaded snapshot");
    Some(records)
}

/// Keep the candidates that decode, carry a unique UUID and pass the field rules
fn admit<I>(candidates: I, fields: &FieldSet) -> Vec<Record>
where
    I: IntoIterator<Item = eyre::Result<Record>>,
{
    let mut seen = HashSet::new();
    let mut records = Vec::new();
    for (index, candidate) in candidates.into_iter().enumerate() {
        let record = match candidate {
            Ok(record) => record,
            Err(e) => {
                warn!(index, error = %format!("{:#}", e), "Skipping undecodable record");
                continue;
            }
        };
        if !validate::validate_record_id(&record.id) || !seen.insert(record.id.clone()) {
            warn!(id = %record.id, "Skipping record with invalid or duplicate id");
            continue;
        }
        if let Err(violations) = validate::validate_record(fields, &record.values) {
            warn!(id = %record.id, fields = ?violations.keys().collect::<Vec<_>>(), "Skipping record that fails the field rules");
            continue;
        }
        records.push(record);
    }
    records
}

/// Default records cut down to the keys `fields` defines
fn seed_records(fields: &FieldSet) -> Vec<Record> {
    default_records()
        .into_iter()
        .map(|mut record| {
            record.values.retain(|key, _| fields.contains(key));
            record
        })
        .collect()
}

/// Seed data used when no snapshot exists
pub fn default_records() -> Vec<Record> {
    vec![
        Record::new(
            "123e4567-e89b-12d3-a456-426614174000",
            payload([
                ("name", FieldValue::from("John Doe")),
                ("address", "Gangnam-gu, Seoul".into()),
                ("memo", "Foreign national".into()),
                ("joinDate", "2024-10-02".into()),
                ("job", "Developer".into()),
                ("emailSubscription", true.into()),
            ]),
        ),
        Record::new(
            "223e4567-e89b-12d3-a456-426614174001",
            payload([
                ("name", FieldValue::from("Foo Bar")),
                ("address", "Seocho-gu, Seoul".into()),
                ("memo", "Korean national".into()),
                ("joinDate", "2024-10-01".into()),
                ("job", "PO".into()),
                ("emailSubscription", false.into()),
            ]),
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::{FieldDefinition, FieldType};
    use crate::storage::{FileStorage, MemoryStorage, SqliteStorage};
    use eyre::eyre;
    use std::cell::Cell;
    use std::rc::Rc;
    use tempfile::TempDir;

    /// Storage whose writes fail while `fail` is set
    struct FlakyStorage {
        inner: MemoryStorage,
        fail: Rc<Cell<bool>>,
    }

    impl Storage for FlakyStorage {
        fn read(&self, key: &str) -> eyre::Result<Option<String>> {
            self.inner.read(key)
        }

        fn write(&mut self, key: &str, snapshot: &str) -> eyre::Result<()> {
            if self.fail.get() {
                return Err(eyre!("disk full"));
            }
            self.inner.write(key, snapshot)
        }
    }

    fn flaky_store(strict: bool) -> (Store, Rc<Cell<bool>>) {
        let fail = Rc::new(Cell::new(true));
        let storage = FlakyStorage {
            inner: MemoryStorage::new(),
            fail: Rc::clone(&fail),
        };
        let options = StoreOptions {
            strict_persistence: strict,
            ..Default::default()
        };
        (Store::open(FieldSet::default(), Some(Box::new(storage)), options), fail)
    }

    fn valid_payload() -> Payload {
        payload([
            ("name", FieldValue::from("Jane Roe")),
            ("address", "Mapo-gu".into()),
            ("memo", "Joined through a referral".into()),
            ("joinDate", "2024-02-29".into()),
            ("job", "Designer".into()),
            ("emailSubscription", true.into()),
        ])
    }

    fn empty_store() -> Store {
        let mut store = Store::in_memory(FieldSet::default());
        let ids: Vec<String> = store.records().iter().map(|r| r.id.clone()).collect();
        store.delete_many(&ids).unwrap();
        store
    }

    #[test]
    fn test_in_memory_starts_with_defaults() {
        let store = Store::in_memory(FieldSet::default());
        assert_eq!(store.list(), default_records());
        assert!(!store.is_persistent());
    }

    #[test]
    fn test_default_records_are_valid() {
        let fields = FieldSet::default();
        for record in default_records() {
            assert!(validate::validate_record_id(&record.id));
            assert!(validate::validate_record(&fields, &record.values).is_ok());
        }
    }

    #[test]
    fn test_seed_records_follow_custom_schema() {
        let strict = FieldSet::from_definitions(vec![
            FieldDefinition::new("nickname", FieldType::Text, "Nickname").required(),
        ])
        .unwrap();
        let store = Store::in_memory(strict);
        assert!(store.is_empty());

        let loose = FieldSet::from_definitions(vec![
            FieldDefinition::new("name", FieldType::Text, "Name").required(),
            FieldDefinition::new("nickname", FieldType::Text, "Nickname"),
        ])
        .unwrap();
        let store = Store::in_memory(loose);
        assert_eq!(store.len(), 2);
        for record in store.records() {
            assert!(validate::validate_record(store.fields(), &record.values).is_ok());
            assert!(record.values.keys().all(|key| store.fields().contains(key)));
        }
    }

    #[test]
    fn test_add_round_trip() {
        let mut store = empty_store();
        let record = store.add(valid_payload()).unwrap();

        assert!(validate::validate_record_id(&record.id));
        assert_eq!(record.values, valid_payload());

        let listed = store.list();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0], record);
    }

    #[test]
    fn test_add_preserves_insertion_order() {
        let mut store = Store::in_memory(FieldSet::default());
        let record = store.add(valid_payload()).unwrap();
        assert_eq!(store.list().last(), Some(&record));
        assert_eq!(store.len(), 3);
    }

    #[test]
    fn test_add_missing_required_field() {
        let mut store = Store::in_memory(FieldSet::default());
        let before = store.list();

        let mut candidate = valid_payload();
        candidate.remove("name");

        let err = store.add(candidate).unwrap_err();
        let violations = err.violations().unwrap();
        assert_eq!(violations["name"], ["Name is required"]);
        assert_eq!(store.list(), before);
        assert_eq!(store.revision(), 0);
    }

    #[test]
    fn test_add_ignores_supplied_id_and_unknown_keys() {
        let mut store = empty_store();
        let mut candidate = valid_payload();
        candidate.insert("id".to_string(), "my-own-id".into());
        candidate.insert("nickname".to_string(), "JR".into());

        let record = store.add(candidate).unwrap();
        assert_ne!(record.id, "my-own-id");
        assert!(record.get("nickname").is_none());
        assert!(record.get("id").is_none());
    }

    #[test]
    fn test_list_is_a_copy() {
        let store = Store::in_memory(FieldSet::default());
        let mut listed = store.list();
        listed.clear();
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_update_merges_and_revalidates() {
        let mut store = Store::in_memory(FieldSet::default());
        let id = store.records()[0].id.clone();

        let updated = store.update(&id, payload([("memo", "Moved to Busan")])).unwrap();
        assert_eq!(updated.get("memo"), Some(&FieldValue::from("Moved to Busan")));
        assert_eq!(updated.get("name"), Some(&FieldValue::from("John Doe")));
        assert_eq!(store.get(&id), Some(&updated));

        let err = store.update(&id, payload([("joinDate", "2024-04-31")])).unwrap_err();
        assert!(err.violations().unwrap().contains_key("joinDate"));
        assert_eq!(store.get(&id).unwrap().get("joinDate"), Some(&FieldValue::from("2024-10-02")));
    }

    #[test]
    fn test_update_cannot_change_id() {
        let mut store = Store::in_memory(FieldSet::default());
        let id = store.records()[0].id.clone();
        let updated = store.update(&id, payload([("id", "other")])).unwrap();
        assert_eq!(updated.id, id);
    }

    #[test]
    fn test_update_not_found() {
        let mut store = Store::in_memory(FieldSet::default());
        let before = store.list();

        let err = store.update("non-existent-id", valid_payload()).unwrap_err();
        assert!(matches!(err, StoreError::NotFound { ref id } if id == "non-existent-id"));
        assert_eq!(store.list(), before);
    }

    #[test]
    fn test_delete() {
        let mut store = Store::in_memory(FieldSet::default());
        let id = store.records()[0].id.clone();

        store.delete(&id).unwrap();
        assert!(store.list().iter().all(|r| r.id != id));

        let err = store.delete(&id).unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
    }

    #[test]
    fn test_delete_many_ignores_missing() {
        let mut store = Store::in_memory(FieldSet::default());
        let id_a = store.records()[0].id.clone();
        let id_b = store.records()[1].id.clone();

        let removed = store.delete_many(&[id_a.as_str(), "missing-id"]).unwrap();
        assert_eq!(removed, 1);
        assert_eq!(store.list().len(), 1);
        assert_eq!(store.records()[0].id, id_b);

        assert_eq!(store.delete_many(&["missing-id"]).unwrap(), 0);
    }

    #[test]
    fn test_validate_does_not_mutate() {
        let store = Store::in_memory(FieldSet::default());
        assert!(store.validate(&valid_payload()).is_ok());
        assert!(store.validate(&Payload::new()).is_err());
        assert_eq!(store.revision(), 0);
    }

    #[test]
    fn test_mutations_persist_snapshot() {
        let temp = TempDir::new().unwrap();
        let id = {
            let storage = FileStorage::open(temp.path()).unwrap();
            let mut store = Store::open(FieldSet::default(), Some(Box::new(storage)), StoreOptions::default());
            let record = store.add(valid_payload()).unwrap();
            store.delete("123e4567-e89b-12d3-a456-426614174000").unwrap();
            record.id
        };

        let storage = FileStorage::open(temp.path()).unwrap();
        let store = Store::open(FieldSet::default(), Some(Box::new(storage)), StoreOptions::default());
        let ids: Vec<&str> = store.records().iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, ["223e4567-e89b-12d3-a456-426614174001", id.as_str()]);
    }

    #[test]
    fn test_sqlite_backed_store() {
        let temp = TempDir::new().unwrap();
        let db_path = temp.path().join("members.db");
        {
            let storage = SqliteStorage::open(&db_path).unwrap();
            let mut store = Store::open(FieldSet::default(), Some(Box::new(storage)), StoreOptions::default());
            store.add(valid_payload()).unwrap();
        }

        let storage = SqliteStorage::open(&db_path).unwrap();
        let store = Store::open(FieldSet::default(), Some(Box::new(storage)), StoreOptions::default());
        assert_eq!(store.len(), 3);
    }

    #[test]
    fn test_malformed_snapshot_falls_back_to_defaults() {
        let mut storage = MemoryStorage::new();
        storage.write(STORAGE_KEY, "{broken").unwrap();

        let store = Store::open(FieldSet::default(), Some(Box::new(storage)), StoreOptions::default());
        assert_eq!(store.list(), default_records());
    }

    #[test]
    fn test_snapshot_with_empty_members_is_respected() {
        let mut storage = MemoryStorage::new();
        storage.write(STORAGE_KEY, r#"{"state":{"members":[]},"version":0}"#).unwrap();

        let store = Store::open(FieldSet::default(), Some(Box::new(storage)), StoreOptions::default());
        assert!(store.is_empty());
    }

    #[test]
    fn test_load_skips_invalid_records() {
        let mut storage = MemoryStorage::new();
        storage
            .write(
                STORAGE_KEY,
                r#"{"state":{"members":[
                    {"id":"123e4567-e89b-12d3-a456-426614174000","name":"Valid","joinDate":"2024-10-02"},
                    {"id":"not-a-uuid","name":"Bad id","joinDate":"2024-10-02"},
                    {"id":"323e4567-e89b-12d3-a456-426614174002","joinDate":"2024-10-02"},
                    {"id":"123e4567-e89b-12d3-a456-426614174000","name":"Duplicate","joinDate":"2024-10-02"}
                ]},"version":0}"#,
            )
            .unwrap();

        let store = Store::open(FieldSet::default(), Some(Box::new(storage)), StoreOptions::default());
        assert_eq!(store.len(), 1);
        assert_eq!(store.records()[0].get("name"), Some(&FieldValue::from("Valid")));
    }

    #[test]
    fn test_load_keeps_valid_records_beside_undecodable_ones() {
        let mut storage = MemoryStorage::new();
        storage
            .write(
                STORAGE_KEY,
                r#"{"state":{"members":[
                    {"id":"123e4567-e89b-12d3-a456-426614174000","name":"Kept","joinDate":"2024-10-02"},
                    {"id":"223e4567-e89b-12d3-a456-426614174001","name":"No job","joinDate":"2024-10-01","job":null},
                    {"id":"323e4567-e89b-12d3-a456-426614174002","name":"Numeric","joinDate":"2024-10-01","memo":7}
                ]},"version":0}"#,
            )
            .unwrap();

        let store = Store::open(FieldSet::default(), Some(Box::new(storage)), StoreOptions::default());
        let names: Vec<String> = store
            .records()
            .iter()
            .filter_map(|r| r.get("name").map(|v| v.to_string()))
            .collect();
        assert_eq!(names, ["Kept", "No job"]);
        assert!(store.records()[1].get("job").is_none());
    }

    #[test]
    fn test_lenient_write_failure_keeps_mutation() {
        let (mut store, fail) = flaky_store(false);

        let record = store.add(valid_payload()).unwrap();
        assert!(store.get(&record.id).is_some());
        assert!(store.persistence_error().unwrap().contains("disk full"));

        fail.set(false);
        store.delete(&record.id).unwrap();
        assert!(store.persistence_error().is_none());
    }

    #[test]
    fn test_strict_write_failure_discards_mutation() {
        let (mut store, fail) = flaky_store(true);
        let before = store.list();

        let err = store.add(valid_payload()).unwrap_err();
        assert!(matches!(err, StoreError::Persistence(_)));
        assert_eq!(store.list(), before);
        assert_eq!(store.revision(), 0);

        fail.set(false);
        assert!(store.add(valid_payload()).is_ok());
        assert_eq!(store.revision(), 1);
    }

    #[test]
    fn test_replace_fields_bumps_revision() {
        let mut store = Store::in_memory(FieldSet::default());
        store.replace_fields(FieldSet::empty());
        assert_eq!(store.revision(), 1);
        assert!(store.fields().is_empty());
    }
}
