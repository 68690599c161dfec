use std::{collections::HashMap, path::{Path, PathBuf}};
use serde_derive::{Deserialize, Serialize};
use crate::bitfield::Bitfield;

#[derive(thiserror::Error, Debug)]
pub enum CacheError {

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("malformed cache file: {0}")]
    Malformed(#[from] serde_json::Error),

}

pub type Result<T> = std::result::Result<T, CacheError>;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Entry {
    #[serde(rename = "infohash")]
    info_hash: String,
    #[serde(rename = "filepath")]
    file_path: PathBuf,
    #[serde(rename = "pieces", with = "bitfield_json")]
    bitfield: Bitfield,
}

// Resume state for every torrent this process has touched, keyed by the
// lowercase hex info-hash. Loaded once at startup and rewritten whenever a
// download session's bitfield changes or a torrent finishes.
#[derive(Debug, Default)]
pub struct ProgressCache {
    entries: HashMap<String, (PathBuf, Bitfield)>,
}

impl ProgressCache {

    // Creates the cache file if it doesn't exist; an empty file loads as
    // an empty mapping rather than a parse error.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            if let Some(dir) = path.parent() {
                if !dir.as_os_str().is_empty() {
                    std::fs::create_dir_all(dir)?;
                }
            }
            std::fs::write(path, b"[]")?;
        }

        let raw = std::fs::read_to_string(path)?;
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }

        let parsed: Vec<Entry> = serde_json::from_str(&raw)?;
        let entries = parsed
            .into_iter()
            .map(|e| {
                // If the partial file this entry points at is gone, the
                // bitfield is lying about what's actually on disk; reset
                // progress rather than let a resume skip pieces that were
                // never written.
                let bitfield = if e.file_path.exists() {
                    e.bitfield
                } else {
                    tracing::warn!(
                        "cache entry {} references missing file {}, resetting progress",
                        e.info_hash,
                        e.file_path.display(),
                    );
                    Bitfield::repeat(false, e.bitfield.len())
                };
                (e.info_hash, (e.file_path, bitfield))
            })
            .collect();

        Ok(Self { entries })
    }

    // Atomically rewrites the cache file: write to a sibling temp file,
    // then rename over the original.
    pub fn save(&self, path: &Path) -> Result<()> {
        let entries: Vec<Entry> = self
            .entries
            .iter()
            .map(|(info_hash, (file_path, bitfield))| Entry {
                info_hash: info_hash.clone(),
                file_path: file_path.clone(),
                bitfield: bitfield.clone(),
            })
            .collect();

        let serialized = serde_json::to_vec_pretty(&entries)?;
        let tmp_path = path.with_extension("tmp");
        std::fs::write(&tmp_path, serialized)?;
        std::fs::rename(tmp_path, path)?;
        Ok(())
    }

    pub fn get(&self, info_hash_hex: &str) -> Option<(&Path, &Bitfield)> {
        self.entries.get(info_hash_hex).map(|(p, b)| (p.as_path(), b))
    }

    pub fn put(&mut self, info_hash_hex: String, file_path: PathBuf, bitfield: Bitfield) {
        self.entries.insert(info_hash_hex, (file_path, bitfield));
    }

    pub fn remove(&mut self, info_hash_hex: &str) {
        self.entries.remove(info_hash_hex);
    }
}

mod bitfield_json {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use crate::bitfield::Bitfield;

    pub fn serialize<S: Serializer>(bitfield: &Bitfield, serializer: S) -> Result<S::Ok, S::Error> {
        bitfield.as_raw_slice().serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Bitfield, D::Error> {
        let bytes = Vec::<u8>::deserialize(deserializer)?;
        Ok(Bitfield::from_vec(bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitfield::BitfieldExt;

    #[test]
    fn load_creates_file_and_returns_empty_mapping() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");
        let cache = ProgressCache::load(&path).unwrap();
        assert!(path.exists());
        assert!(cache.get("deadbeef").is_none());
    }

    #[test]
    fn put_then_save_then_load_round_trips_bitfield() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");
        let partial_path = dir.path().join("file.tmp");
        std::fs::write(&partial_path, b"partial contents").unwrap();

        let mut bitfield = Bitfield::new_of_bits(10);
        bitfield.set(3);
        bitfield.set(7);

        let mut cache = ProgressCache::load(&path).unwrap();
        cache.put("abc123".into(), partial_path.clone(), bitfield.clone());
        cache.save(&path).unwrap();

        let reloaded = ProgressCache::load(&path).unwrap();
        let (file_path, reloaded_bitfield) = reloaded.get("abc123").unwrap();
        assert_eq!(file_path, partial_path);
        assert_eq!(reloaded_bitfield, &bitfield);
    }

    #[test]
    fn load_resets_bitfield_when_partial_file_is_missing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");
        let missing_partial = dir.path().join("gone.tmp");

        let mut bitfield = Bitfield::new_of_bits(10);
        bitfield.set(3);
        bitfield.set(7);

        let mut cache = ProgressCache::load(&path).unwrap();
        cache.put("abc123".into(), missing_partial.clone(), bitfield);
        cache.save(&path).unwrap();

        let reloaded = ProgressCache::load(&path).unwrap();
        let (file_path, reloaded_bitfield) = reloaded.get("abc123").unwrap();
        assert_eq!(file_path, missing_partial);
        assert_eq!(reloaded_bitfield.popcount(), 0);
        assert_eq!(reloaded_bitfield.len(), 16);
    }

    #[test]
    fn save_leaves_no_temp_file_behind() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");
        let mut cache = ProgressCache::load(&path).unwrap();
        cache.put("xyz".into(), PathBuf::from("/tmp/x"), Bitfield::new_of_bits(1));
        cache.save(&path).unwrap();
        assert!(!path.with_extension("tmp").exists());
    }
}
