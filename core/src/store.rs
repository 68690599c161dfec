use std::path::PathBuf;
use crate::metainfo::MetaInfo;

// General information on torrent storage. Single-file torrents only: the
// downloaded data is written straight to `output_dir.join(name)`, there is
// no per-file layout to resolve.
#[derive(Debug, Clone)]
pub struct StoreInfo {

    // File name, as advertised in the metainfo.
    pub name: String,

    // Length of torrent in bytes.
    pub total_len: u64,

    // Length of pieces in bytes.
    pub piece_len: usize,

    // Length of the last piece, will be <= piece_len.
    pub last_piece_len: usize,

    // Number of pieces in torrent.
    pub num_pieces: u32,

    // Directory to store the downloaded file in.
    pub output_dir: PathBuf,
}

impl StoreInfo {

    pub fn new(metainfo: &MetaInfo, output_dir: PathBuf) -> Self {

        let total_len = metainfo.total_len();
        let num_pieces = metainfo.num_pieces();
        let piece_len = metainfo.piece_len();
        let last_piece_len = (total_len - (piece_len as u64 * (num_pieces as u64 - 1))) as usize;

        Self {
            name: metainfo.name().to_string(),
            total_len,
            piece_len,
            last_piece_len,
            num_pieces,
            output_dir,
        }
    }

    // Full path of the downloaded file.
    pub fn file_path(&self) -> PathBuf {
        self.output_dir.join(&self.name)
    }

    // Returns length of piece given its index.
    pub fn piece_length(&self, idx: usize) -> usize {
        if idx as u32 == self.num_pieces - 1 {
            self.last_piece_len
        } else {
            self.piece_len
        }
    }

    pub fn piece_byte_offset(&self, piece_idx: usize) -> usize {
        piece_idx * self.piece_len
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metainfo(total_len: u64, piece_len: u32) -> MetaInfo {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sample.bin");
        std::fs::write(&path, vec![0u8; total_len as usize]).unwrap();
        let announce = url::Url::parse("http://tracker.example.com:6969/announce").unwrap();
        MetaInfo::from_file(&path, announce, piece_len).unwrap()
    }

    #[test]
    fn last_piece_len_is_remainder() {
        let info = metainfo(2049, 1024);
        let store = StoreInfo::new(&info, PathBuf::from("downloads"));
        assert_eq!(store.num_pieces, 3);
        assert_eq!(store.piece_length(0), 1024);
        assert_eq!(store.piece_length(1), 1024);
        assert_eq!(store.piece_length(2), 1);
    }

    #[test]
    fn file_path_joins_output_dir_and_name() {
        let info = metainfo(10, 1024);
        let store = StoreInfo::new(&info, PathBuf::from("downloads"));
        assert_eq!(store.file_path(), PathBuf::from("downloads/sample.bin"));
    }
}
