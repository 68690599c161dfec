#![allow(unused)]

use serde_derive::{self, Deserialize, Serialize};

use crate::{decode_bytes, encode_to_raw, encode_to_string};

#[derive(Debug, Deserialize, Serialize, PartialEq, Eq)]
struct File {
    path: Vec<String>,
    length: i64,
    #[serde(default)]
    md5sum: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, PartialEq, Eq)]
struct Info {
    name: String,
    #[serde(with = "serde_bytes")]
    pieces: Vec<u8>,
    #[serde(rename = "piece length")]
    piece_length: i64,
    #[serde(default)]
    length: Option<i64>,
    #[serde(default)]
    files: Option<Vec<File>>,
    #[serde(default)]
    private: Option<u8>,
}

#[derive(Debug, Deserialize, Serialize, PartialEq, Eq)]
struct Torrent {
    announce: String,
    info: Info,
    #[serde(default)]
    encoding: Option<String>,
    #[serde(default)]
    #[serde(rename = "creation date")]
    creation_date: Option<i64>,
    #[serde(default)]
    comment: Option<String>,
}

fn sample_torrent() -> Torrent {
    Torrent {
        announce: "http://tracker.example.com:6969/announce".to_string(),
        info: Info {
            name: "file.iso".to_string(),
            pieces: vec![7u8; 40],
            piece_length: 32_768,
            length: Some(65_536),
            files: None,
            private: Some(0),
        },
        encoding: Some("UTF-8".to_string()),
        creation_date: Some(1_700_000_000),
        comment: Some("made for testing".to_string()),
    }
}

#[test]
fn torrent_round_trips_through_bencode() {
    let torrent = sample_torrent();
    let raw = encode_to_raw(&torrent).unwrap();
    let decoded: Torrent = decode_bytes(&raw).unwrap();
    assert_eq!(decoded, torrent);
}

#[test]
fn dict_keys_are_sorted_lexicographically() {
    // Peers rely on byte-identical info-hashes, which depends on dictionary
    // keys being emitted in sorted order regardless of struct field order.
    let encoded = encode_to_string(&sample_torrent().info).unwrap();
    let name_pos = encoded.find("4:name").unwrap();
    let pieces_pos = encoded.find("6:pieces").unwrap();
    let piece_length_pos = encoded.find("12:piece length").unwrap();
    assert!(name_pos < piece_length_pos);
    assert!(piece_length_pos < pieces_pos);
}
