#![allow(dead_code)]

mod metainfo;
mod store;
mod tracker;
mod p2p;
mod fs;
mod block;
mod de;
mod stats;
mod bitfield;
mod work;
mod cache;
mod config;
mod event;
mod download;
mod upload;
mod supervisor;

const BLOCK_SIZE: usize = 0x4000;

pub use bitfield::{Bitfield, BitfieldExt};
pub use metainfo::MetaInfo;
pub use config::Config;
pub use cache::ProgressCache;
pub use event::Event;
pub use download::DownloadError;
pub use upload::UploadError;
pub use supervisor::{Supervisor, SupervisorError, TorrentState};
pub use tracker::Tracker;
