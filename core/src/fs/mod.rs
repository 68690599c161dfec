use std::{
    os::unix::fs::FileExt,
    path::Path,
    sync::{Arc, Mutex},
};
use tokio::task;

#[derive(thiserror::Error, Debug)]
pub enum DiskError {

    #[error(transparent)]
    IoError(#[from] std::io::Error),

}

pub type Result<T> = std::result::Result<T, DiskError>;

// Owns the sole writable handle to a download's partial file. Every write
// is a positional write-at on a blocking thread, so concurrent workers
// never contend on a shared file cursor; the assembler is the only writer.
#[derive(Debug)]
pub struct Assembler {
    file: std::fs::File,
}

impl Assembler {

    // Opens (creating if absent) the partial file and pre-allocates it to
    // `total_len` bytes so positional writes never need to extend the file.
    pub fn open(path: &Path, total_len: u64) -> Result<Self> {
        if let Some(dir) = path.parent() {
            if !dir.as_os_str().is_empty() && !dir.is_dir() {
                std::fs::create_dir_all(dir)?;
            }
        }
        let file = std::fs::OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(path)?;
        file.set_len(total_len)?;
        Ok(Self { file })
    }

    pub async fn write_piece(self: &Arc<Self>, offset: u64, data: Vec<u8>) -> Result<()> {
        let this = Arc::clone(self);
        task::spawn_blocking(move || this.file.write_at(&data, offset))
            .await
            .expect("assembler write task panicked")?;
        Ok(())
    }

    // Renames the partial file to its final name once every piece verifies.
    pub fn finalize(tmp_path: &Path, final_path: &Path) -> Result<()> {
        std::fs::rename(tmp_path, final_path)?;
        Ok(())
    }
}

// Answers on-demand positional reads for a file being seeded. Pieces are
// cached after first read since a burst of block requests for the same
// piece, often from different peers, is the common case while seeding.
#[derive(Debug)]
pub struct SeedStore {
    file: std::fs::File,
    read_cache: Mutex<lru::LruCache<usize, Arc<Vec<u8>>>>,
}

impl SeedStore {

    pub fn open(path: &Path) -> Result<Arc<Self>> {
        let file = std::fs::OpenOptions::new().read(true).open(path)?;
        Ok(Arc::new(Self {
            file,
            // Unwrap safe, 32 is always > 0.
            read_cache: Mutex::new(lru::LruCache::new(std::num::NonZeroUsize::new(32).unwrap())),
        }))
    }

    // Reads `len` bytes at `offset` within piece `piece_idx` (whose whole
    // extent is `piece_offset..piece_offset + piece_len` in the file).
    pub async fn read_block(
        self: &Arc<Self>,
        piece_idx: usize,
        piece_offset: u64,
        piece_len: usize,
        offset: usize,
        len: usize,
    ) -> Result<Vec<u8>> {

        if let Some(cached) = self.read_cache.lock().expect("read cache poisoned").get(&piece_idx) {
            return Ok(cached[offset..offset + len].to_vec());
        }

        let this = Arc::clone(self);
        let buf = task::spawn_blocking(move || -> Result<Vec<u8>> {
            let mut buf = vec![0u8; piece_len];
            this.file.read_exact_at(&mut buf, piece_offset)?;
            Ok(buf)
        }).await.expect("seed read task panicked")?;

        let buf = Arc::new(buf);
        self.read_cache.lock().expect("read cache poisoned").put(piece_idx, Arc::clone(&buf));
        Ok(buf[offset..offset + len].to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn assembler_writes_at_offset_and_preallocates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("download.tmp");
        let assembler = Arc::new(Assembler::open(&path, 20).unwrap());

        assembler.write_piece(10, vec![7; 5]).await.unwrap();

        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(bytes.len(), 20);
        assert_eq!(&bytes[10..15], &[7; 5]);
        assert_eq!(&bytes[0..10], &[0; 10]);
    }

    #[test]
    fn finalize_renames_partial_to_final() {
        let dir = tempfile::tempdir().unwrap();
        let tmp = dir.path().join("movie.mp4.tmp");
        let final_path = dir.path().join("movie.mp4");
        std::fs::write(&tmp, b"hello").unwrap();

        Assembler::finalize(&tmp, &final_path).unwrap();

        assert!(!tmp.exists());
        assert_eq!(std::fs::read(&final_path).unwrap(), b"hello");
    }

    #[tokio::test]
    async fn seed_store_reads_block_and_caches_piece() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("seed.bin");
        let data: Vec<u8> = (0..100u16).map(|n| n as u8).collect();
        std::fs::write(&path, &data).unwrap();

        let store = SeedStore::open(&path).unwrap();
        let block = store.read_block(0, 10, 20, 5, 4).await.unwrap();
        assert_eq!(block, data[15..19].to_vec());

        // Second read of the same piece should hit the cache and return
        // identical bytes for a different sub-range.
        let block = store.read_block(0, 10, 20, 0, 20).await.unwrap();
        assert_eq!(block, data[10..30].to_vec());
    }
}
