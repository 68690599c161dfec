use std::{path::PathBuf, sync::Arc};
use tokio::sync::{mpsc, watch, Mutex};

use crate::{
    bitfield::{Bitfield, BitfieldExt},
    cache::ProgressCache,
    fs::{Assembler, DiskError},
    metainfo::MetaInfo,
    p2p::outbound::{self, PieceResult},
    stats::Counter,
    store::StoreInfo,
    tracker::{AnnounceParams, Event as TrackerEvent, TrackerError},
    work::{WorkItem, WorkQueue},
};

#[derive(thiserror::Error, Debug)]
pub enum DownloadError {

    #[error("tracker returned no peers")]
    NoPeers,

    #[error(transparent)]
    Tracker(#[from] TrackerError),

    #[error(transparent)]
    Disk(#[from] DiskError),

    #[error("download cancelled")]
    Cancelled,

    #[error("every worker ended with {completed}/{total} pieces verified")]
    WorkersExhausted { completed: usize, total: usize },

}

pub type Result<T> = std::result::Result<T, DownloadError>;

// Drives one torrent from an empty (or resumed) bitfield to a completed
// file: announces to the tracker, spawns one outbound worker per peer
// the tracker returned, and assembles verified pieces as they arrive
// until every piece is accounted for.
#[tracing::instrument(skip(metainfo, cache, cancel), fields(torrent = metainfo.name()))]
pub async fn run(
    metainfo: &MetaInfo,
    output_dir: PathBuf,
    peer_id: [u8; 20],
    port: u16,
    cache: Arc<Mutex<ProgressCache>>,
    mut cancel: watch::Receiver<bool>,
) -> Result<PathBuf> {

    let info = StoreInfo::new(metainfo, output_dir);
    let info_hash = metainfo.info_hash();
    let info_hash_hex = metainfo.info_hash_hex();
    let num_pieces = info.num_pieces as usize;

    let tracker_tiers = metainfo.trackers();
    let tracker = tracker_tiers
        .first()
        .and_then(|tier| tier.first())
        .expect("a metainfo always yields at least one tracker")
        .clone();

    let mut bitfield = {
        let cache = cache.lock().await;
        cache.get(&info_hash_hex).map(|(_, bf)| bf.clone())
    }.unwrap_or_else(|| Bitfield::new_of_bits(num_pieces));

    let uploaded = Counter::default();
    let downloaded = Counter::default();
    let resumed_bytes: u64 = (0..num_pieces)
        .filter(|&i| bitfield.has(i))
        .map(|i| info.piece_length(i) as u64)
        .sum();
    downloaded.add(resumed_bytes);

    let announce = tracker.announce(AnnounceParams {
        info_hash,
        peer_id,
        port,
        uploaded: uploaded.total(),
        downloaded: downloaded.total(),
        left: info.total_len - downloaded.total(),
        event: Some(TrackerEvent::Started),
    }).await?;

    if announce.peers.is_empty() {
        return Err(DownloadError::NoPeers);
    }

    let tmp_path = info.output_dir.join(format!("{}.tmp", info.name));
    let assembler = Arc::new(Assembler::open(&tmp_path, info.total_len)?);

    let piece_hashes = metainfo.piece_hashes();
    let queue_items: Vec<WorkItem> = (0..num_pieces)
        .filter(|&i| !bitfield.has(i))
        .map(|i| WorkItem { index: i, hash: piece_hashes[i], length: info.piece_length(i) })
        .collect();
    let mut completed = num_pieces - queue_items.len();
    let queue = WorkQueue::new(queue_items);

    let (results_tx, mut results_rx) = mpsc::unbounded_channel::<PieceResult>();

    let mut workers = Vec::with_capacity(announce.peers.len());
    for addr in announce.peers {
        let queue = queue.clone();
        let results_tx = results_tx.clone();
        let worker_cancel = cancel.clone();
        workers.push(tokio::spawn(async move {
            if let Err(e) = outbound::run(addr, info_hash, peer_id, queue, results_tx, worker_cancel).await {
                tracing::debug!("outbound worker for {} ended: {}", addr, e);
            }
        }));
    }
    drop(results_tx);

    while completed < num_pieces {
        tokio::select! {
            result = results_rx.recv() => {
                let Some(result) = result else { break };
                let offset = info.piece_byte_offset(result.index) as u64;
                let len = result.data.len() as u64;
                assembler.write_piece(offset, result.data).await?;
                bitfield.set(result.index);
                downloaded.add(len);
                completed += 1;
                queue.mark_done();

                let mut cache = cache.lock().await;
                cache.put(info_hash_hex.clone(), tmp_path.clone(), bitfield.clone());
            },
            _ = cancel.changed() => {
                tracker.announce(AnnounceParams {
                    info_hash,
                    peer_id,
                    port,
                    uploaded: uploaded.total(),
                    downloaded: downloaded.total(),
                    left: info.total_len - downloaded.total(),
                    event: Some(TrackerEvent::Stopped),
                }).await.ok();
                cache.lock().await.put(info_hash_hex.clone(), tmp_path.clone(), bitfield.clone());
                for worker in workers {
                    worker.abort();
                }
                return Err(DownloadError::Cancelled);
            },
        }
    }

    // The assembly loop's non-cancel exit is `results_rx.recv() == None`,
    // meaning every worker sender has dropped — which happens both on
    // success and when the worker pool is exhausted before every piece
    // verified (e.g. every peer was bad or unreachable). Only the former
    // is a completed download; finalizing on the latter would rename a
    // partially zero-filled file into place and falsely report success.
    if completed < num_pieces {
        tracing::warn!("workers exhausted with {}/{} pieces verified", completed, num_pieces);
        tracker.announce(AnnounceParams {
            info_hash,
            peer_id,
            port,
            uploaded: uploaded.total(),
            downloaded: downloaded.total(),
            left: info.total_len - downloaded.total(),
            event: Some(TrackerEvent::Stopped),
        }).await.ok();
        cache.lock().await.put(info_hash_hex.clone(), tmp_path.clone(), bitfield.clone());
        for worker in workers {
            worker.abort();
        }
        return Err(DownloadError::WorkersExhausted { completed, total: num_pieces });
    }

    tracker.announce(AnnounceParams {
        info_hash,
        peer_id,
        port,
        uploaded: uploaded.total(),
        downloaded: downloaded.total(),
        left: 0,
        event: Some(TrackerEvent::Completed),
    }).await?;

    let final_path = info.file_path();
    Assembler::finalize(&tmp_path, &final_path)?;
    cache.lock().await.remove(&info_hash_hex);

    for worker in workers {
        worker.abort();
    }

    Ok(final_path)
}
