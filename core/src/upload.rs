use tokio::sync::watch;

use crate::{
    metainfo::MetaInfo,
    tracker::{AnnounceParams, Event as TrackerEvent, TrackerError},
};

#[derive(thiserror::Error, Debug)]
pub enum UploadError {

    #[error(transparent)]
    Tracker(#[from] TrackerError),

}

pub type Result<T> = std::result::Result<T, UploadError>;

// Keeps a seeded torrent's tracker entry alive: announce `started`, sleep
// the announce interval, re-announce as a keep-alive, repeat, until
// cancelled. Inbound connections for this torrent are serviced
// independently, one task per connection, by the supervisor.
#[tracing::instrument(skip(metainfo, cancel), fields(torrent = metainfo.name()))]
pub async fn run(
    metainfo: &MetaInfo,
    peer_id: [u8; 20],
    port: u16,
    uploaded_total: impl Fn() -> u64,
    mut cancel: watch::Receiver<bool>,
) -> Result<()> {

    let tracker_tiers = metainfo.trackers();
    let tracker = tracker_tiers
        .first()
        .and_then(|tier| tier.first())
        .expect("a metainfo always yields at least one tracker")
        .clone();

    let params = |event| AnnounceParams {
        info_hash: metainfo.info_hash(),
        peer_id,
        port,
        uploaded: uploaded_total(),
        downloaded: metainfo.total_len(),
        left: 0,
        event: Some(event),
    };

    let announce = tracker.announce(params(TrackerEvent::Started)).await?;
    let mut interval = std::time::Duration::from_secs(announce.interval_minutes * 60);

    loop {
        tokio::select! {
            _ = tokio::time::sleep(interval) => {
                let announce = tracker.announce(params(TrackerEvent::Started)).await?;
                interval = std::time::Duration::from_secs(announce.interval_minutes * 60);
            },
            _ = cancel.changed() => {
                tracker.announce(params(TrackerEvent::Stopped)).await.ok();
                return Ok(());
            },
        }
    }
}
