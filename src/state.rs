use std::{
    collections::BTreeMap,
    fs,
    io::{self, Write},
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::domain::{RecordPatch, StagingRecord};

pub const SCHEMA_VERSION: u32 = 1;

#[derive(Debug)]
pub enum StoreError {
    Io(io::Error),
    SerdeJson(serde_json::Error),
    MissingRecord { key: String },
    SchemaVersionMismatch { expected: u32, got: u32 },
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "io error: {e}"),
            Self::SerdeJson(e) => write!(f, "json error: {e}"),
            Self::MissingRecord { key } => write!(f, "no staging record for key {key}"),
            Self::SchemaVersionMismatch { expected, got } => {
                write!(f, "schema_version mismatch: expected {expected}, got {got}")
            }
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::SerdeJson(e) => Some(e),
            Self::MissingRecord { .. } | Self::SchemaVersionMismatch { .. } => None,
        }
    }
}

impl From<io::Error> for StoreError {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(value: serde_json::Error) -> Self {
        Self::SerdeJson(value)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PersistedState {
    pub schema_version: u32,
    #[serde(default)]
    pub records: BTreeMap<String, StagingRecord>,
}

impl PersistedState {
    pub fn empty() -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            records: BTreeMap::new(),
        }
    }
}

/// File-backed snapshot of the staging collection. One record per slot,
/// keyed by a store-assigned ULID. Every mutation rewrites the whole file
/// atomically; there is no finer-grained durability.
#[derive(Debug)]
pub struct JsonStagingStore {
    state_path: PathBuf,
    state: PersistedState,
}

impl JsonStagingStore {
    pub fn load_or_init(data_dir: &Path) -> Result<Self, StoreError> {
        fs::create_dir_all(data_dir)?;

        let state_path = data_dir.join("staging.json");
        let (state, is_new) = if state_path.exists() {
            let bytes = fs::read(&state_path)?;
            let state: PersistedState = serde_json::from_slice(&bytes)?;
            if state.schema_version != SCHEMA_VERSION {
                return Err(StoreError::SchemaVersionMismatch {
                    expected: SCHEMA_VERSION,
                    got: state.schema_version,
                });
            }
            (state, false)
        } else {
            (PersistedState::empty(), true)
        };

        let store = Self { state_path, state };
        if is_new {
            store.save()?;
        }
        Ok(store)
    }

    /// Snapshot of the whole collection. Callers hold the store lock for the
    /// duration of a read-modify-write, so the reference stays consistent.
    pub fn records(&self) -> &BTreeMap<String, StagingRecord> {
        &self.state.records
    }

    /// Merges the patch's present fields into the record at `key` and
    /// persists. Absent fields are left untouched. Fails with `MissingRecord`
    /// if the key vanished since the caller's snapshot.
    pub fn apply_patch(
        &mut self,
        key: &str,
        patch: RecordPatch,
    ) -> Result<StagingRecord, StoreError> {
        let record = self
            .state
            .records
            .get_mut(key)
            .ok_or_else(|| StoreError::MissingRecord {
                key: key.to_string(),
            })?;

        if let Some(user) = patch.user {
            record.user = user;
        }
        if let Some(branch) = patch.branch {
            record.branch = branch;
        }
        if let Some(timestamp) = patch.timestamp {
            record.timestamp = timestamp;
        }
        if let Some(time_string) = patch.time_string {
            record.time_string = time_string;
        }

        let updated = record.clone();
        self.save()?;
        Ok(updated)
    }

    /// Out-of-band provisioning only; request handlers never create records.
    pub fn insert_record(&mut self, record: StagingRecord) -> Result<String, StoreError> {
        let key = Ulid::new().to_string();
        self.state.records.insert(key.clone(), record);
        self.save()?;
        Ok(key)
    }

    pub fn save(&self) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec_pretty(&self.state)?;
        write_atomic(&self.state_path, &bytes)?;
        Ok(())
    }
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), io::Error> {
    let dir = path.parent().ok_or_else(|| {
        io::Error::new(io::ErrorKind::InvalidInput, "path has no parent directory")
    })?;
    let file_name = path
        .file_name()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "path has no file name"))?;
    let tmp_path = dir.join(format!("{}.tmp", file_name.to_string_lossy()));
    {
        let mut file = fs::File::create(&tmp_path)?;
        file.write_all(bytes)?;
        file.write_all(b"\n")?;
        let _ = file.sync_all();
    }

    #[cfg(windows)]
    {
        if path.exists() {
            let _ = fs::remove_file(path);
        }
    }

    fs::rename(tmp_path, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn record(hostname: &str) -> StagingRecord {
        StagingRecord {
            hostname: hostname.to_string(),
            name: "env1".to_string(),
            ip: "10.0.0.1".to_string(),
            user: "alice".to_string(),
            branch: "main".to_string(),
            timestamp: 1000,
            time_string: "05:46 AM January 1st, 1970".to_string(),
        }
    }

    #[test]
    fn load_or_init_creates_empty_collection() {
        let tmp = tempfile::tempdir().unwrap();
        let store = JsonStagingStore::load_or_init(tmp.path()).unwrap();
        assert!(store.records().is_empty());
        assert!(tmp.path().join("staging.json").exists());
    }

    #[test]
    fn inserted_record_survives_reload() {
        let tmp = tempfile::tempdir().unwrap();
        let mut store = JsonStagingStore::load_or_init(tmp.path()).unwrap();
        let key = store.insert_record(record("h1")).unwrap();

        let reloaded = JsonStagingStore::load_or_init(tmp.path()).unwrap();
        assert_eq!(reloaded.records().get(&key), Some(&record("h1")));
    }

    #[test]
    fn apply_patch_merges_only_present_fields() {
        let tmp = tempfile::tempdir().unwrap();
        let mut store = JsonStagingStore::load_or_init(tmp.path()).unwrap();
        let key = store.insert_record(record("h1")).unwrap();

        let updated = store
            .apply_patch(
                &key,
                RecordPatch {
                    user: Some("bob".to_string()),
                    branch: Some("feature-x".to_string()),
                    timestamp: Some(2000),
                    time_string: Some("06:03 AM January 1st, 1970".to_string()),
                },
            )
            .unwrap();

        assert_eq!(updated.user, "bob");
        assert_eq!(updated.branch, "feature-x");
        assert_eq!(updated.timestamp, 2000);
        // Identity fields are untouched by a claim patch.
        assert_eq!(updated.hostname, "h1");
        assert_eq!(updated.name, "env1");
        assert_eq!(updated.ip, "10.0.0.1");
    }

    #[test]
    fn apply_patch_with_empty_patch_is_a_noop() {
        let tmp = tempfile::tempdir().unwrap();
        let mut store = JsonStagingStore::load_or_init(tmp.path()).unwrap();
        let key = store.insert_record(record("h1")).unwrap();

        let updated = store.apply_patch(&key, RecordPatch::default()).unwrap();
        assert_eq!(updated, record("h1"));
    }

    #[test]
    fn apply_patch_on_missing_key_fails() {
        let tmp = tempfile::tempdir().unwrap();
        let mut store = JsonStagingStore::load_or_init(tmp.path()).unwrap();
        let err = store
            .apply_patch("nope", RecordPatch::default())
            .unwrap_err();
        assert!(matches!(err, StoreError::MissingRecord { .. }));
    }

    #[test]
    fn schema_version_mismatch_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(
            tmp.path().join("staging.json"),
            br#"{"schema_version": 99, "records": {}}"#,
        )
        .unwrap();

        let err = JsonStagingStore::load_or_init(tmp.path()).unwrap_err();
        assert!(matches!(
            err,
            StoreError::SchemaVersionMismatch {
                expected: SCHEMA_VERSION,
                got: 99
            }
        ));
    }
}
