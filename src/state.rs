#![forbid(unsafe_code)]

//! Per-video read/starred/archived flags persisted in a single JSON file.
//!
//! The file maps video ids to [`VideoState`] records. A record only exists for
//! ids that were explicitly updated; anything absent reads as all-false.

use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;

/// Flags tracked for a single video.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct VideoState {
    pub read: bool,
    pub starred: bool,
    pub archived: bool,
}

impl VideoState {
    /// Reads one persisted record. Flags are coerced loosely and missing
    /// ones default to false; anything but an object is not a record.
    fn from_value(value: &Value) -> Option<Self> {
        let Value::Object(fields) = value else {
            return None;
        };
        let flag = |key: &str| fields.get(key).is_some_and(truthy);
        Some(Self {
            read: flag("read"),
            starred: flag("starred"),
            archived: flag("archived"),
        })
    }
}

pub type StateMap = BTreeMap<String, VideoState>;

/// Partial update coming from a PATCH body. `None` leaves a flag untouched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StateUpdate {
    pub read: Option<bool>,
    pub starred: Option<bool>,
    pub archived: Option<bool>,
}

impl StateUpdate {
    /// Parses a request body. An empty body is an empty update; anything that
    /// is not a JSON object is rejected.
    pub fn from_body(body: &[u8]) -> Result<Self> {
        if body.is_empty() {
            return Ok(Self::default());
        }
        let value: Value = serde_json::from_slice(body).context("parsing state update")?;
        let Value::Object(fields) = value else {
            anyhow::bail!("state update must be a JSON object");
        };
        let flag = |key: &str| fields.get(key).map(truthy);
        Ok(Self {
            read: flag("read"),
            starred: flag("starred"),
            archived: flag("archived"),
        })
    }

    fn apply(&self, state: &mut VideoState) {
        if let Some(read) = self.read {
            state.read = read;
        }
        if let Some(starred) = self.starred {
            state.starred = starred;
        }
        if let Some(archived) = self.archived {
            state.archived = archived;
        }
    }
}

/// Loose boolean coercion: empty and zero-like values are false.
fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64().is_some_and(|n| n != 0.0),
        Value::String(text) => !text.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(fields) => !fields.is_empty(),
    }
}

/// File-backed store. The mutex serializes read/modify/write cycles inside
/// one process; other processes writing the same file still race.
pub struct StateStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl StateStore {
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the persisted mapping, or an empty one when the file is
    /// missing or unreadable.
    pub fn load(&self) -> StateMap {
        let _guard = self.lock.lock();
        self.read_file()
    }

    pub fn save(&self, state: &StateMap) -> Result<()> {
        let _guard = self.lock.lock();
        write_json_atomic(&self.path, state)
    }

    /// Creates the record with defaults when absent, merges the provided
    /// flags and persists. Returns the record as stored.
    pub fn update(&self, video_id: &str, update: &StateUpdate) -> Result<VideoState> {
        let _guard = self.lock.lock();
        let mut state = self.read_file();
        let entry = state.entry(video_id.to_string()).or_default();
        update.apply(entry);
        let updated = *entry;
        write_json_atomic(&self.path, &state)?;
        Ok(updated)
    }

    /// Drops the record for `video_id`. The file is only rewritten when a
    /// record was actually present.
    pub fn remove(&self, video_id: &str) -> Result<bool> {
        let _guard = self.lock.lock();
        let mut state = self.read_file();
        if state.remove(video_id).is_none() {
            return Ok(false);
        }
        write_json_atomic(&self.path, &state)?;
        Ok(true)
    }

    /// Entries are converted one by one so a single odd record cannot wipe
    /// the rest of the file on the next write.
    fn read_file(&self) -> StateMap {
        let Ok(raw) = fs::read_to_string(&self.path) else {
            return StateMap::new();
        };
        match serde_json::from_str::<Value>(&raw) {
            Ok(Value::Object(entries)) => entries
                .iter()
                .filter_map(|(id, record)| Some((id.clone(), VideoState::from_value(record)?)))
                .collect(),
            _ => StateMap::new(),
        }
    }
}

fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
    }
    let tmp_path = path.with_extension("tmp");
    let payload = serde_json::to_vec_pretty(value)?;
    fs::write(&tmp_path, payload).with_context(|| format!("writing {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replacing {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    fn store_in(dir: &Path) -> StateStore {
        StateStore::open(dir.join("state.json"))
    }

    #[test]
    fn load_missing_file_is_empty() {
        let dir = tempdir().unwrap();
        assert!(store_in(dir.path()).load().is_empty());
    }

    #[test]
    fn load_corrupt_file_is_empty() {
        let dir = tempdir().unwrap();
        let store = store_in(dir.path());
        fs::write(store.path(), "{not json").unwrap();
        assert!(store.load().is_empty());

        fs::write(store.path(), "[1, 2, 3]").unwrap();
        assert!(store.load().is_empty());
    }

    #[test]
    fn load_fills_missing_flags_with_false() {
        let dir = tempdir().unwrap();
        let store = store_in(dir.path());
        fs::write(store.path(), r#"{"abcdefgh123": {"starred": true}}"#).unwrap();
        let state = store.load();
        assert_eq!(
            state["abcdefgh123"],
            VideoState {
                starred: true,
                ..VideoState::default()
            }
        );
    }

    #[test]
    fn odd_entries_do_not_discard_the_rest() {
        let dir = tempdir().unwrap();
        let store = store_in(dir.path());
        fs::write(
            store.path(),
            r#"{
                "keepme12345": {"read": true, "starred": true, "archived": false},
                "oddentry123": {"read": 1, "starred": "no", "archived": null},
                "notarecord1": 5
            }"#,
        )
        .unwrap();

        store
            .update(
                "abcdefgh123",
                &StateUpdate {
                    read: Some(true),
                    ..StateUpdate::default()
                },
            )
            .unwrap();

        let state = store.load();
        assert_eq!(
            state["keepme12345"],
            VideoState {
                read: true,
                starred: true,
                archived: false,
            }
        );
        assert_eq!(
            state["oddentry123"],
            VideoState {
                read: true,
                starred: true,
                archived: false,
            }
        );
        assert!(state["abcdefgh123"].read);
        assert!(!state.contains_key("notarecord1"));
    }

    #[test]
    fn update_creates_record_with_defaults() {
        let dir = tempdir().unwrap();
        let store = store_in(dir.path());
        let update = StateUpdate {
            starred: Some(true),
            ..StateUpdate::default()
        };
        let record = store.update("abcdefgh123", &update).unwrap();
        assert_eq!(
            record,
            VideoState {
                read: false,
                starred: true,
                archived: false,
            }
        );
        assert_eq!(store.load()["abcdefgh123"], record);
    }

    #[test]
    fn empty_update_creates_default_record() {
        let dir = tempdir().unwrap();
        let store = store_in(dir.path());
        let record = store
            .update("abcdefgh123", &StateUpdate::default())
            .unwrap();
        assert_eq!(record, VideoState::default());
        assert!(store.load().contains_key("abcdefgh123"));
    }

    #[test]
    fn update_merges_with_existing_record() {
        let dir = tempdir().unwrap();
        let store = store_in(dir.path());
        store
            .update(
                "abcdefgh123",
                &StateUpdate {
                    read: Some(true),
                    ..StateUpdate::default()
                },
            )
            .unwrap();
        let record = store
            .update(
                "abcdefgh123",
                &StateUpdate {
                    archived: Some(true),
                    ..StateUpdate::default()
                },
            )
            .unwrap();
        assert!(record.read);
        assert!(record.archived);
        assert!(!record.starred);
    }

    #[test]
    fn remove_reports_presence() {
        let dir = tempdir().unwrap();
        let store = store_in(dir.path());
        assert!(!store.remove("abcdefgh123").unwrap());
        assert!(!store.path().exists());

        store
            .update("abcdefgh123", &StateUpdate::default())
            .unwrap();
        assert!(store.remove("abcdefgh123").unwrap());
        assert!(store.load().is_empty());
    }

    #[test]
    fn save_writes_pretty_json() {
        let dir = tempdir().unwrap();
        let store = store_in(dir.path());
        let mut state = StateMap::new();
        state.insert("abcdefgh123".into(), VideoState::default());
        store.save(&state).unwrap();
        let raw = fs::read_to_string(store.path()).unwrap();
        assert!(raw.contains("\n  \"abcdefgh123\""));
        assert!(!dir.path().join("state.tmp").exists());
    }

    #[test]
    fn from_body_coerces_flags_and_ignores_unknown_keys() {
        let body = json!({
            "read": 1,
            "starred": "",
            "archived": null,
            "color": "red",
        });
        let update = StateUpdate::from_body(body.to_string().as_bytes()).unwrap();
        assert_eq!(
            update,
            StateUpdate {
                read: Some(true),
                starred: Some(false),
                archived: Some(false),
            }
        );
    }

    #[test]
    fn from_body_accepts_empty_body() {
        assert_eq!(StateUpdate::from_body(b"").unwrap(), StateUpdate::default());
    }

    #[test]
    fn from_body_rejects_malformed_and_non_objects() {
        assert!(StateUpdate::from_body(b"{oops").is_err());
        assert!(StateUpdate::from_body(b"[\"read\"]").is_err());
        assert!(StateUpdate::from_body(b"  ").is_err());
    }

    #[test]
    fn truthy_follows_loose_rules() {
        assert!(truthy(&json!(true)));
        assert!(truthy(&json!("yes")));
        assert!(truthy(&json!([0])));
        assert!(truthy(&json!({"a": 1})));
        assert!(truthy(&json!(-2.5)));
        assert!(!truthy(&json!(0)));
        assert!(!truthy(&json!(0.0)));
        assert!(!truthy(&json!([])));
        assert!(!truthy(&json!({})));
    }
}
