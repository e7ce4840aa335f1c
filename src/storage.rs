use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::error::StorageError;
use crate::model::{Channel, Playlist, Store};

pub const MAX_HISTORY: usize = 50;

/// JSON-file backed owner of the [`Store`] document.
///
/// Reads share the lock, mutations take it exclusively and rewrite the whole
/// file before releasing it. A failed write leaves the in-memory change in
/// place; the next successful write brings the file back in line.
pub struct Storage {
    path: PathBuf,
    data: RwLock<Store>,
}

impl Storage {
    /// Loads the document at `path`, starting empty when the file is missing
    /// or unreadable. Nothing is written until the first mutation.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let data = match Self::load(&path) {
            Ok(store) => {
                tracing::info!(
                    path = %path.display(),
                    playlists = store.playlists.len(),
                    history = store.history.len(),
                    "loaded data file"
                );
                store
            }
            Err(e) => {
                tracing::info!(path = %path.display(), reason = %e, "starting with an empty store");
                Store::default()
            }
        };

        Self {
            path,
            data: RwLock::new(data),
        }
    }

    fn load(path: &Path) -> anyhow::Result<Store> {
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn read_all(&self) -> Store {
        self.read().clone()
    }

    pub fn playlists(&self) -> Vec<Playlist> {
        self.read().playlists.clone()
    }

    pub fn history(&self) -> Vec<Channel> {
        self.read().history.clone()
    }

    /// Replaces the playlist with the same id in place, or appends it.
    pub fn upsert_playlist(&self, playlist: Playlist) -> Result<(), StorageError> {
        let mut data = self.write();
        match data.playlists.iter_mut().find(|p| p.id == playlist.id) {
            Some(existing) => *existing = playlist,
            None => data.playlists.push(playlist),
        }
        self.persist(&data)
    }

    /// Removes every playlist with `id`. A missing id is not an error.
    pub fn delete_playlist(&self, id: &str) -> Result<(), StorageError> {
        let mut data = self.write();
        data.playlists.retain(|p| p.id != id);
        self.persist(&data)
    }

    /// Moves `channel` to the front of the history, dropping any earlier
    /// entry with the same url and anything past [`MAX_HISTORY`].
    pub fn record_history(&self, channel: Channel) -> Result<(), StorageError> {
        let mut data = self.write();
        data.history.retain(|h| h.url != channel.url);
        data.history.insert(0, channel);
        data.history.truncate(MAX_HISTORY);
        self.persist(&data)
    }

    pub fn clear_history(&self) -> Result<(), StorageError> {
        let mut data = self.write();
        data.history.clear();
        self.persist(&data)
    }

    fn read(&self) -> RwLockReadGuard<'_, Store> {
        self.data.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Store> {
        self.data.write().unwrap_or_else(PoisonError::into_inner)
    }

    // Called with the write lock held so concurrent mutations hit the disk in order.
    fn persist(&self, data: &Store) -> Result<(), StorageError> {
        let encoded = serde_json::to_vec_pretty(data)?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| StorageError::write(parent, e))?;
        }

        let tmp_path = self.tmp_path();
        fs::write(&tmp_path, &encoded).map_err(|e| StorageError::write(&tmp_path, e))?;
        fs::rename(&tmp_path, &self.path).map_err(|e| StorageError::write(&self.path, e))?;

        tracing::debug!(path = %self.path.display(), bytes = encoded.len(), "persisted store");
        Ok(())
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(OsString::from)
            .unwrap_or_else(|| OsString::from("webplayer-data.json"));
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_storage() -> (tempfile::TempDir, Storage) {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::new(dir.path().join("data.json"));
        (dir, storage)
    }

    fn playlist(id: &str, name: &str) -> Playlist {
        Playlist {
            id: id.to_string(),
            name: name.to_string(),
            channels: vec![],
            created_at: 1_700_000_000,
        }
    }

    fn channel(id: &str, url: &str) -> Channel {
        Channel {
            id: id.to_string(),
            name: format!("name-{id}"),
            url: url.to_string(),
            group: "news".to_string(),
            logo: String::new(),
            added_at: 1_700_000_000,
        }
    }

    #[test]
    fn test_missing_file_starts_empty() {
        let (dir, storage) = temp_storage();
        assert_eq!(storage.read_all(), Store::default());
        assert!(!dir.path().join("data.json").exists());
    }

    #[test]
    fn test_corrupt_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.json");
        fs::write(&path, "{ not json").unwrap();

        let storage = Storage::new(&path);
        assert!(storage.playlists().is_empty());
        assert!(storage.history().is_empty());
        assert_eq!(fs::read_to_string(&path).unwrap(), "{ not json");
    }

    #[test]
    fn test_upsert_replaces_in_place() {
        let (_dir, storage) = temp_storage();
        storage.upsert_playlist(playlist("a", "first")).unwrap();
        storage.upsert_playlist(playlist("b", "second")).unwrap();
        storage.upsert_playlist(playlist("c", "third")).unwrap();

        storage.upsert_playlist(playlist("b", "renamed")).unwrap();

        let playlists = storage.playlists();
        assert_eq!(playlists.len(), 3);
        let names: Vec<_> = playlists.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, ["first", "renamed", "third"]);
    }

    #[test]
    fn test_delete_playlist() {
        let (_dir, storage) = temp_storage();
        storage.upsert_playlist(playlist("a", "first")).unwrap();
        storage.upsert_playlist(playlist("b", "second")).unwrap();

        storage.delete_playlist("does-not-exist").unwrap();
        assert_eq!(storage.playlists().len(), 2);

        storage.delete_playlist("a").unwrap();
        let playlists = storage.playlists();
        assert_eq!(playlists.len(), 1);
        assert_eq!(playlists[0].id, "b");
    }

    #[test]
    fn test_history_dedups_by_url() {
        let (_dir, storage) = temp_storage();
        storage.record_history(channel("1", "http://x/1")).unwrap();
        storage.record_history(channel("2", "http://x/2")).unwrap();

        let mut again = channel("3", "http://x/1");
        again.name = "updated".to_string();
        storage.record_history(again).unwrap();

        let history = storage.history();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].id, "3");
        assert_eq!(history[0].name, "updated");
        assert_eq!(history[1].url, "http://x/2");
    }

    #[test]
    fn test_history_keeps_most_recent_fifty() {
        let (_dir, storage) = temp_storage();
        for i in 0..55 {
            storage
                .record_history(channel(&i.to_string(), &format!("http://x/{i}")))
                .unwrap();
        }

        let history = storage.history();
        assert_eq!(history.len(), MAX_HISTORY);
        let ids: Vec<String> = history.iter().map(|c| c.id.clone()).collect();
        let expected: Vec<String> = (5..55).rev().map(|i: i32| i.to_string()).collect();
        assert_eq!(ids, expected);
    }

    #[test]
    fn test_clear_history() {
        let (_dir, storage) = temp_storage();
        storage.record_history(channel("1", "http://x/1")).unwrap();
        storage.clear_history().unwrap();
        assert!(storage.history().is_empty());
    }

    #[test]
    fn test_reload_roundtrip() {
        let (dir, storage) = temp_storage();
        let mut p = playlist("a", "first");
        p.channels = vec![channel("c1", "http://x/1"), channel("c2", "http://x/2")];
        storage.upsert_playlist(p).unwrap();
        storage.upsert_playlist(playlist("b", "second")).unwrap();
        storage.record_history(channel("1", "http://x/1")).unwrap();
        storage.record_history(channel("2", "http://x/2")).unwrap();

        let reloaded = Storage::new(dir.path().join("data.json"));
        assert_eq!(reloaded.read_all(), storage.read_all());
    }

    #[test]
    fn test_file_is_indented_camel_case_json() {
        let (dir, storage) = temp_storage();
        storage.record_history(channel("1", "http://x/1")).unwrap();

        let raw = fs::read_to_string(dir.path().join("data.json")).unwrap();
        assert!(raw.starts_with("{\n  \"playlists\": []"));
        assert!(raw.contains("\"addedAt\": 1700000000"));
        assert!(!dir.path().join("data.json.tmp").exists());
    }

    #[test]
    fn test_failed_write_keeps_memory_change() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, "").unwrap();
        let storage = Storage::new(blocker.join("data.json"));

        let err = storage.upsert_playlist(playlist("a", "first")).unwrap_err();
        assert!(matches!(err, StorageError::Write { .. }));
        assert_eq!(storage.playlists().len(), 1);
    }

    #[test]
    fn test_concurrent_reads_share_snapshot() {
        let (_dir, storage) = temp_storage();
        storage.upsert_playlist(playlist("a", "first")).unwrap();
        storage.record_history(channel("1", "http://x/1")).unwrap();
        let expected = storage.read_all();

        let snapshots: Vec<Store> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..16).map(|_| s.spawn(|| storage.read_all())).collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert!(snapshots.iter().all(|snap| *snap == expected));
    }

    #[test]
    fn test_concurrent_writers_all_land() {
        let (dir, storage) = temp_storage();
        std::thread::scope(|s| {
            for i in 0..8 {
                let storage = &storage;
                s.spawn(move || {
                    storage
                        .upsert_playlist(playlist(&format!("p{i}"), "concurrent"))
                        .unwrap()
                });
            }
        });

        assert_eq!(storage.playlists().len(), 8);
        let reloaded = Storage::new(dir.path().join("data.json"));
        assert_eq!(reloaded.playlists().len(), 8);
    }
}
