// src/system/record_store.rs

//! The catalog of source records that result files are attached to. The real
//! catalog lives on the remote platform; the harvester only needs to find a
//! record for a scan and write metadata onto it.

use crate::models::SourceRecord;
use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors raised by a [`SourceRecordStore`].
#[derive(Error, Debug)]
pub enum StoreError {
    /// Reading or writing the backing file failed.
    #[error("Filesystem Error: {0}")]
    Io(#[from] std::io::Error),
    /// The backing file is not a JSON list of records.
    #[error("Failed to read source records from '{path}': {source}")]
    Parse {
        /// The backing file.
        path: String,
        /// Underlying parser error.
        #[source]
        source: serde_json::Error,
    },
    /// The records could not be turned back into JSON.
    #[error("Failed to serialize source records: {0}")]
    Serialize(#[from] serde_json::Error),
    /// The record to update is unknown.
    #[error("Source record '{0}' is not in the store.")]
    UnknownRecord(String),
}

/// The capability the harvester needs from the catalog.
pub trait SourceRecordStore {
    /// Finds the record a scan's results belong to, if any.
    fn find(&self, scan_id: &str) -> Option<SourceRecord>;

    /// Merges `metadata` into the record's stored metadata.
    fn update_metadata(
        &mut self,
        record: &SourceRecord,
        metadata: &Map<String, Value>,
    ) -> Result<(), StoreError>;

    /// Persists pending metadata updates. Stores that write through need not
    /// override this.
    fn save(&mut self) -> Result<(), StoreError> {
        Ok(())
    }
}

/// First-match-wins association: the first image record whose stored BIDS file
/// name contains `scan_id`. Sidecars and records without a BIDS name never match.
pub fn find_matching_record<'a>(
    records: &'a [SourceRecord],
    scan_id: &str,
) -> Option<&'a SourceRecord> {
    records.iter().find(|record| {
        record.is_image_payload()
            && record
                .original_filename()
                .is_some_and(|name| name.contains(scan_id))
    })
}

/// Recursively merges `patch` into `target`. Objects merge key by key; any
/// other value replaces what was there.
pub fn merge_json(target: &mut Map<String, Value>, patch: &Map<String, Value>) {
    for (key, value) in patch {
        match (target.get_mut(key), value) {
            (Some(Value::Object(existing)), Value::Object(incoming)) => {
                merge_json(existing, incoming);
            }
            _ => {
                target.insert(key.clone(), value.clone());
            }
        }
    }
}

/// A record store backed by a JSON array on disk.
#[derive(Debug, Default)]
pub struct LocalRecordStore {
    records: Vec<SourceRecord>,
    path: Option<PathBuf>,
    dirty: bool,
}

impl LocalRecordStore {
    /// A store with no records; every result ends up in the batch document.
    pub fn empty() -> Self {
        Self::default()
    }

    /// A store over in-memory records, never persisted.
    pub fn from_records(records: Vec<SourceRecord>) -> Self {
        Self {
            records,
            path: None,
            dirty: false,
        }
    }

    /// Loads records from a JSON file.
    pub fn load(path: &Path) -> Result<Self, StoreError> {
        let content = fs::read_to_string(path)?;
        let records: Vec<SourceRecord> =
            serde_json::from_str(&content).map_err(|source| StoreError::Parse {
                path: path.display().to_string(),
                source,
            })?;
        log::debug!(
            "Loaded {} source records from '{}'",
            records.len(),
            path.display()
        );
        Ok(Self {
            records,
            path: Some(path.to_path_buf()),
            dirty: false,
        })
    }

    /// All records, in file order.
    pub fn records(&self) -> &[SourceRecord] {
        &self.records
    }
}

impl SourceRecordStore for LocalRecordStore {
    fn find(&self, scan_id: &str) -> Option<SourceRecord> {
        find_matching_record(&self.records, scan_id).cloned()
    }

    fn update_metadata(
        &mut self,
        record: &SourceRecord,
        metadata: &Map<String, Value>,
    ) -> Result<(), StoreError> {
        let stored = self
            .records
            .iter_mut()
            .find(|r| r.id == record.id)
            .ok_or_else(|| StoreError::UnknownRecord(record.id.clone()))?;
        merge_json(&mut stored.info, metadata);
        self.dirty = true;
        Ok(())
    }

    /// Writes the records back to the file they came from, if anything changed.
    fn save(&mut self) -> Result<(), StoreError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if !self.dirty {
            return Ok(());
        }
        let json = serde_json::to_string_pretty(&self.records)?;
        fs::write(path, json)?;
        log::info!("Saved updated source records to '{}'", path.display());
        self.dirty = false;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn record(id: &str, name: &str, bids_filename: Option<&str>) -> SourceRecord {
        let info = match bids_filename {
            Some(f) => json!({"BIDS": {"Filename": f}}),
            None => json!({}),
        };
        serde_json::from_value(json!({"id": id, "name": name, "info": info})).unwrap()
    }

    #[test]
    fn test_find_skips_sidecars_and_unannotated_records() {
        let records = vec![
            record("a", "sub-01_T1w.json", Some("sub-01_T1w.json")),
            record("b", "sub-01_T1w.nii.gz", None),
            record("c", "sub-01_T1w.nii.gz", Some("sub-01_T1w.nii.gz")),
        ];
        let found = find_matching_record(&records, "sub-01_T1w").unwrap();
        assert_eq!(found.id, "c");
    }

    #[test]
    fn test_find_first_match_wins() {
        let records = vec![
            record("first", "x.nii.gz", Some("sub-01_ses-1_T1w.nii.gz")),
            record("second", "y.nii.gz", Some("sub-01_ses-1_T1w.nii.gz")),
        ];
        assert_eq!(
            find_matching_record(&records, "sub-01_ses-1_T1w").map(|r| r.id.as_str()),
            Some("first")
        );
        assert!(find_matching_record(&records, "sub-02").is_none());
    }

    #[test]
    fn test_merge_json_is_deep() {
        let mut target = json!({"BIDS": {"Filename": "f"}, "derived": {"old": 1}})
            .as_object()
            .cloned()
            .unwrap();
        let patch = json!({"derived": {"IQM": {"cjv": 0.4}}})
            .as_object()
            .cloned()
            .unwrap();
        merge_json(&mut target, &patch);
        assert_eq!(
            Value::Object(target),
            json!({"BIDS": {"Filename": "f"}, "derived": {"old": 1, "IQM": {"cjv": 0.4}}})
        );
    }

    #[test]
    fn test_update_unknown_record_fails() {
        let mut store = LocalRecordStore::empty();
        let result = store.update_metadata(&record("z", "z.nii", None), &Map::new());
        assert!(matches!(result, Err(StoreError::UnknownRecord(_))));
    }

    #[test]
    fn test_load_update_and_save_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("records.json");
        let records = vec![record("c", "sub-01_T1w.nii.gz", Some("sub-01_T1w.nii.gz"))];
        fs::write(&path, serde_json::to_string(&records).unwrap()).unwrap();

        let mut store = LocalRecordStore::load(&path).unwrap();
        let found = store.find("sub-01_T1w").unwrap();
        let patch = json!({"derived": {"IQM": {"cjv": 0.4}}})
            .as_object()
            .cloned()
            .unwrap();
        store.update_metadata(&found, &patch).unwrap();
        store.save().unwrap();

        let reloaded = LocalRecordStore::load(&path).unwrap();
        assert_eq!(
            reloaded.records()[0].info["derived"]["IQM"]["cjv"],
            json!(0.4)
        );
    }

    #[test]
    fn test_load_rejects_malformed_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("records.json");
        fs::write(&path, "{not json").unwrap();
        assert!(matches!(
            LocalRecordStore::load(&path),
            Err(StoreError::Parse { .. })
        ));
    }
}
