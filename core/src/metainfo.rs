use rand::seq::SliceRandom;
use serde_derive::{Deserialize, Serialize};
use sha1::Digest;
use crate::tracker::Tracker;

#[derive(Debug, thiserror::Error)]
pub enum MetaInfoError {

    #[error("bencode error whilst decoding metainfo: {0}")]
    BencodeError(#[from] bencode::Error),

    #[error("invalid file extension, expected .torrent")]
    InvalidExtension,

    #[error(transparent)]
    IoError(#[from] std::io::Error),

    #[error("invalid pieces length, must be divisible by 20")]
    InvalidPiecesLength,
}

#[derive(Clone, Deserialize, Serialize)]
pub struct Info {

    // File name.
    pub name: String,

    // String consisting of the concatenation of all 20-byte SHA1 hash values, one per piece.
    #[serde(with = "serde_bytes")]
    pub pieces: Vec<u8>,

    // Number of bytes in each piece (integer).
    #[serde(rename = "piece length")]
    pub piece_length: u32,

    // A 32-character hexadecimal string corresponding to the MD5 sum of the file.
    #[serde(default)]
    pub md5sum: Option<String>,

    // Length of the file in bytes (integer).
    pub length: u64,

    // If it is set to "1", the client MUST publish its presence to get other peers ONLY
    // via the trackers explicitly described in the metainfo file. If this field is set to
    // "0" or is not present, the client may obtain peer from other means, e.g. PEX, DHT.
    // Ours is always absent: no DHT, no PEX.
    #[serde(default)]
    pub private: Option<u8>,
}

impl Info {
    // Calculates the sha1 hash of info dict to verify torrent integrity.
    fn info_hash(&self) -> Result<[u8; 20], MetaInfoError> {
        let mut hasher = sha1::Sha1::new();
        // Serialize info dict into bencode.
        let info_data = bencode::encode_to_raw(&self)?;
        hasher.update(info_data);
        Ok(hasher.finalize().into())
    }
}

#[derive(Deserialize, Clone)]
pub struct MetaInfo {

    // The announce URL of the tracker (string).
    #[serde(deserialize_with = "crate::de::url_deserialize")]
    pub announce: url::Url,

    // A dictionary that describes the file of the torrent.
    pub info: Info,

    // sha1 hash of info dict.
    #[serde(skip)]
    pub info_hash: [u8; 20],

    // (optional) the string encoding format used to generate the pieces part of the info
    // dictionary in the .torrent metafile (string).
    #[serde(default)]
    pub encoding: Option<String>,

    // (optional) this is an extension to the official specification, offering backwards-compatibility.
    #[serde(default)]
    #[serde(rename = "announce-list")]
    #[serde(deserialize_with = "crate::de::announce_list_deserialize")]
    pub announce_list: Option<Vec<Vec<url::Url>>>,

    // (optional) the creation time of the torrent, in standard UNIX epoch format.
    #[serde(default)]
    #[serde(rename = "creation date")]
    pub creation_date: Option<i64>,

    // (optional) free-form textual comments of the author (string).
    #[serde(default)]
    pub comment: Option<String>,

    // (optional) name and version of the program used to create the .torrent (string).
    #[serde(default)]
    #[serde(rename = "created by")]
    pub created_by: Option<String>,
}

impl MetaInfo {

    pub fn new<P: AsRef<std::path::Path>>(path: P) -> Result<MetaInfo, MetaInfoError> {

        if path.as_ref().extension().unwrap_or_default() != "torrent" {
            return Err(MetaInfoError::InvalidExtension);
        }

        let mut metainfo: MetaInfo = bencode::decode_bytes(&std::fs::read(path)?)?;

        if metainfo.info.pieces.len() % 20 != 0 || metainfo.info.pieces.is_empty() {
            return Err(MetaInfoError::InvalidPiecesLength);
        }

        metainfo.info_hash = metainfo.info.info_hash()?;
        tracing::debug!("metainfo created: {:#?}", metainfo);
        Ok(metainfo)
    }

    // Builds a metainfo describing a single local file, hashing it piece by
    // piece. The final piece may be shorter than `piece_length`.
    pub fn from_file<P: AsRef<std::path::Path>>(
        path: P,
        announce: url::Url,
        piece_length: u32,
    ) -> Result<MetaInfo, MetaInfoError> {
        use std::io::Read;

        let path = path.as_ref();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let mut file = std::fs::File::open(path)?;
        let total_len = file.metadata()?.len();

        let mut pieces = Vec::new();
        let mut buf = vec![0u8; piece_length as usize];
        loop {
            let n = read_up_to(&mut file, &mut buf)?;
            if n == 0 {
                break;
            }
            let mut hasher = sha1::Sha1::new();
            hasher.update(&buf[..n]);
            pieces.extend_from_slice(&hasher.finalize());
            if n < buf.len() {
                break;
            }
        }

        let info = Info {
            name,
            pieces,
            piece_length,
            md5sum: None,
            length: total_len,
            private: None,
        };
        let info_hash = info.info_hash()?;

        Ok(MetaInfo {
            announce,
            info,
            info_hash,
            encoding: None,
            announce_list: None,
            creation_date: None,
            comment: None,
            created_by: None,
        })
    }

    pub fn piece_hashes(&self) -> Vec<[u8; 20]> {
        self.info.pieces
            .chunks_exact(20)
            // Safe as we have already checked length is a multiple of 20, in new.
            .map(|c| c.try_into().unwrap())
            .collect()
    }

    pub fn piece_len(&self) -> usize { self.info.piece_length as usize }

    pub fn num_pieces(&self) -> u32 { self.info.pieces.len() as u32 / 20 }

    pub fn total_len(&self) -> u64 { self.info.length }

    pub fn info_hash(&self) -> [u8; 20] { self.info_hash }

    pub fn name(&self) -> &str { &self.info.name }

    pub fn trackers(&self) -> Vec<Vec<Tracker>> {
        // If announce_list is present, we use that.
        if let Some(announce_list) = self.announce_list.clone() {
            let mut trackers = Vec::new();
            for mut tier in announce_list {
                let mut tier_trackers = Vec::new();
                // Randomly shuffle the trackers in the tier.
                tier.shuffle(&mut rand::thread_rng());
                for url in tier {
                    tier_trackers.push(Tracker::new(url));
                }
                trackers.push(tier_trackers);
            }
            trackers
        // Otherwise we just use the announce key.
        } else {
            vec![vec![Tracker::new(self.announce.clone())]]
        }
    }

    // Formatting methods.

    pub fn info_hash_hex(&self) -> String {
        hex::encode(self.info_hash)
    }

    pub fn size_fmt(&self) -> String {
        format_size(self.info.length)
    }
}

fn read_up_to(file: &mut std::fs::File, buf: &mut [u8]) -> std::io::Result<usize> {
    use std::io::Read;
    let mut total = 0;
    while total < buf.len() {
        let n = file.read(&mut buf[total..])?;
        if n == 0 {
            break;
        }
        total += n;
    }
    Ok(total)
}

fn format_size(bytes: u64) -> String {
    let mut size = bytes as f64;
    let mut unit = "B";
    if size > 1024.0 {
        size /= 1024.0;
        unit = "KiB";
    }
    if size > 1024.0 {
        size /= 1024.0;
        unit = "MiB";
    }
    if size > 1024.0 {
        size /= 1024.0;
        unit = "GiB";
    }
    if size > 1024.0 {
        size /= 1024.0;
        unit = "TiB";
    }
    format!("{:.2} {}", size, unit)
}

impl std::fmt::Debug for MetaInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetaInfo")
            .field("announce", &self.announce.as_str())
            .field("info", &self.info)
            .field("info_hash", &self.info_hash_hex())
            .field("encoding", &self.encoding)
            // Change urls to strings for printing.
            .field("announce_list", &self.announce_list.as_ref().map(|v|
                v.iter().map(|v|
                    v.iter().map(|v|
                        v.as_str()
                    ).collect()
                ).collect::<Vec<Vec<&str>>>()
            ))
            .field("creation_date", &self.creation_date)
            .field("comment", &self.comment)
            .field("created_by", &self.created_by)
            .finish()
    }
}

// Dont want to print out the pieces field, so we implement Debug manually.
impl std::fmt::Debug for Info {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Info")
            .field("name", &self.name)
            .field("num pieces", &(self.pieces.len() / 20))
            .field("piece_length", &self.piece_length)
            .field("md5sum", &self.md5sum)
            .field("length", &self.length)
            .field("private", &self.private)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_file_hashes_every_piece_and_matches_length() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sample.bin");
        std::fs::write(&path, vec![7u8; 2049]).unwrap();

        let announce = url::Url::parse("http://tracker.example.com:6969/announce").unwrap();
        let metainfo = MetaInfo::from_file(&path, announce, 1024).unwrap();

        assert_eq!(metainfo.total_len(), 2049);
        assert_eq!(metainfo.num_pieces(), 3);
        assert_eq!(metainfo.piece_len(), 1024);

        let hashes = metainfo.piece_hashes();
        assert_eq!(hashes.len(), 3);

        let mut hasher = sha1::Sha1::new();
        hasher.update(vec![7u8; 1]);
        let last: [u8; 20] = hasher.finalize().into();
        assert_eq!(hashes[2], last);
    }

    #[test]
    fn info_hash_is_stable_across_encodings() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sample.bin");
        std::fs::write(&path, vec![1u8; 10]).unwrap();
        let announce = url::Url::parse("http://tracker.example.com:6969/announce").unwrap();

        let a = MetaInfo::from_file(&path, announce.clone(), 1024).unwrap();
        let b = MetaInfo::from_file(&path, announce, 1024).unwrap();
        assert_eq!(a.info_hash(), b.info_hash());
    }
}
