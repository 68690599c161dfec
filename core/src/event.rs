use std::path::PathBuf;
use crate::metainfo::MetaInfo;

// What the supervisor's event queue carries. Each event is handled in its
// own task; `main` enqueues one `Upload` per `--seed` file and one
// `Download` per `--leech` file at startup.
#[derive(Debug)]
pub enum Event {

    // Begin leeching `metainfo` into `output_dir`, auto-seeding on completion.
    Download { metainfo: MetaInfo, output_dir: PathBuf },

    // Begin seeding `metainfo` from the already-complete file at `file_path`.
    Upload { metainfo: MetaInfo, file_path: PathBuf },

}
