use std::{collections::HashMap, net::SocketAddr, sync::Arc, time::Duration};
use tokio::{
    net::TcpListener,
    sync::{mpsc, watch, Mutex, RwLock},
    task::JoinHandle,
};

use crate::{
    cache::{CacheError, ProgressCache},
    config::Config,
    download::{self, DownloadError},
    event::Event,
    p2p::inbound::{self, SeedEntry, SeedTable},
    upload,
};

const SHUTDOWN_GRACE: Duration = Duration::from_secs(3);

#[derive(thiserror::Error, Debug)]
pub enum SupervisorError {

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Cache(#[from] CacheError),

}

pub type Result<T> = std::result::Result<T, SupervisorError>;

// The supervisor's per-torrent view, tracking the state machine described
// for C10: Idle is implicit (no entry yet); Starting/Downloading/Failed
// cover an active download; a download auto-transitions to Seeding once
// complete; Stopped marks a cancelled download whose progress is cached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TorrentState {
    Starting,
    Downloading,
    Downloaded,
    Seeding,
    Failed,
    Stopped,
}

// Process-level object owning the listening socket, the event queue, and
// every active session. One instance per running process; constructed
// once in `main` and driven until shutdown.
pub struct Supervisor {
    peer_id: [u8; 20],
    port: u16,
    config: Config,
    cache: Arc<Mutex<ProgressCache>>,
    seeds: SeedTable,
    sessions: Arc<RwLock<HashMap<String, TorrentState>>>,
    tasks: Arc<Mutex<Vec<JoinHandle<()>>>>,
    events_tx: mpsc::UnboundedSender<Event>,
    events_rx: Mutex<Option<mpsc::UnboundedReceiver<Event>>>,
    cancel_tx: watch::Sender<bool>,
    cancel_rx: watch::Receiver<bool>,
}

impl Supervisor {

    pub fn new(peer_id: [u8; 20], port: u16, config: Config) -> Result<Self> {
        let cache = ProgressCache::load(&config.cache_path)?;
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (cancel_tx, cancel_rx) = watch::channel(false);

        Ok(Self {
            peer_id,
            port,
            config,
            cache: Arc::new(Mutex::new(cache)),
            seeds: Arc::new(RwLock::new(HashMap::new())),
            sessions: Arc::new(RwLock::new(HashMap::new())),
            tasks: Arc::new(Mutex::new(Vec::new())),
            events_tx,
            events_rx: Mutex::new(Some(events_rx)),
            cancel_tx,
            cancel_rx,
        })
    }

    // Handle callers use to feed `start`/`list` derived events in.
    pub fn events(&self) -> mpsc::UnboundedSender<Event> {
        self.events_tx.clone()
    }

    pub async fn state_of(&self, info_hash_hex: &str) -> Option<TorrentState> {
        self.sessions.read().await.get(info_hash_hex).copied()
    }

    // Binds the listener, then services inbound connections and queued
    // events concurrently until cancellation is signalled from another
    // task (e.g. a Ctrl-C handler holding a clone of `cancel_tx`).
    pub async fn run(self: &Arc<Self>) -> Result<()> {
        let listener = TcpListener::bind(("0.0.0.0", self.port)).await?;
        tracing::info!("listening on port {}", self.port);

        let mut events_rx = self.events_rx.lock().await.take().expect("run called twice");
        let mut cancel = self.cancel_rx.clone();

        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    let (stream, addr) = match accepted {
                        Ok(pair) => pair,
                        Err(e) => { tracing::warn!("accept error: {}", e); continue; },
                    };
                    self.spawn_inbound(stream, addr).await;
                },
                event = events_rx.recv() => {
                    match event {
                        Some(event) => self.spawn_event(event).await,
                        None => break,
                    }
                },
                _ = cancel.changed() => {
                    if *cancel.borrow() {
                        break;
                    }
                },
            }
        }

        self.shutdown().await;
        Ok(())
    }

    pub fn shutdown_handle(&self) -> watch::Sender<bool> {
        self.cancel_tx.clone()
    }

    async fn spawn_inbound(self: &Arc<Self>, stream: tokio::net::TcpStream, addr: SocketAddr) {
        let seeds = Arc::clone(&self.seeds);
        let peer_id = self.peer_id;
        let handle = tokio::spawn(async move {
            if let Err(e) = inbound::run(stream, addr, peer_id, seeds).await {
                tracing::debug!("inbound session with {} ended: {}", addr, e);
            }
        });
        self.tasks.lock().await.push(handle);
    }

    async fn spawn_event(self: &Arc<Self>, event: Event) {
        match event {
            Event::Download { metainfo, output_dir } => self.spawn_download(metainfo, output_dir).await,
            Event::Upload { metainfo, file_path } => self.spawn_upload(metainfo, file_path).await,
        }
    }

    async fn spawn_download(self: &Arc<Self>, metainfo: crate::metainfo::MetaInfo, output_dir: std::path::PathBuf) {
        let info_hash_hex = metainfo.info_hash_hex();

        {
            let mut sessions = self.sessions.write().await;
            if matches!(sessions.get(&info_hash_hex), Some(TorrentState::Starting | TorrentState::Downloading)) {
                tracing::debug!("ignoring duplicate download event for {}", info_hash_hex);
                return;
            }
            sessions.insert(info_hash_hex.clone(), TorrentState::Starting);
        }

        let supervisor = Arc::clone(self);
        let cache = Arc::clone(&self.cache);
        let peer_id = self.peer_id;
        let port = self.port;
        let cancel = self.cancel_rx.clone();

        let handle = tokio::spawn(async move {
            supervisor.sessions.write().await.insert(info_hash_hex.clone(), TorrentState::Downloading);

            match download::run(&metainfo, output_dir.clone(), peer_id, port, cache, cancel).await {
                Ok(final_path) => {
                    supervisor.sessions.write().await.insert(info_hash_hex.clone(), TorrentState::Downloaded);
                    supervisor.begin_seeding(metainfo, final_path).await;
                },
                Err(DownloadError::Cancelled) => {
                    supervisor.sessions.write().await.insert(info_hash_hex.clone(), TorrentState::Stopped);
                },
                Err(e) => {
                    tracing::error!("download of {} failed: {}", info_hash_hex, e);
                    supervisor.sessions.write().await.insert(info_hash_hex.clone(), TorrentState::Failed);
                },
            }
        });
        self.tasks.lock().await.push(handle);
    }

    async fn spawn_upload(self: &Arc<Self>, metainfo: crate::metainfo::MetaInfo, file_path: std::path::PathBuf) {
        self.begin_seeding(metainfo, file_path).await;
    }

    // Registers a completed or pre-existing file for seeding and starts
    // its keep-alive announce loop (C9). Shared by both a freshly finished
    // download and a `--seed` file supplied directly on the command line.
    async fn begin_seeding(self: &Arc<Self>, metainfo: crate::metainfo::MetaInfo, file_path: std::path::PathBuf) {
        let info_hash_hex = metainfo.info_hash_hex();

        let store = match crate::fs::SeedStore::open(&file_path) {
            Ok(store) => store,
            Err(e) => {
                tracing::error!("cannot seed {}: {}", file_path.display(), e);
                self.sessions.write().await.insert(info_hash_hex, TorrentState::Failed);
                return;
            },
        };

        self.seeds.write().await.insert(metainfo.info_hash(), SeedEntry {
            store,
            piece_len: metainfo.piece_len(),
            total_len: metainfo.total_len(),
        });
        self.sessions.write().await.insert(info_hash_hex.clone(), TorrentState::Seeding);

        let peer_id = self.peer_id;
        let port = self.port;
        let uploaded = Arc::new(crate::stats::Counter::default());
        let cancel = self.cancel_rx.clone();

        let handle = tokio::spawn(async move {
            let uploaded_fn = {
                let uploaded = Arc::clone(&uploaded);
                move || uploaded.total()
            };
            if let Err(e) = upload::run(&metainfo, peer_id, port, uploaded_fn, cancel).await {
                tracing::debug!("seed loop for {} ended: {}", info_hash_hex, e);
            }
        });
        self.tasks.lock().await.push(handle);
    }

    // Stops accepting new connections, signals cancellation to every
    // active session, waits a bounded grace period for them to drain,
    // then persists the cache.
    async fn shutdown(&self) {
        tracing::info!("shutting down");
        let _ = self.cancel_tx.send(true);

        let handles: Vec<JoinHandle<()>> = std::mem::take(&mut *self.tasks.lock().await);
        let drain = futures::future::join_all(handles);
        if tokio::time::timeout(SHUTDOWN_GRACE, drain).await.is_err() {
            tracing::warn!("shutdown grace period elapsed with sessions still draining");
        }

        if let Err(e) = self.cache.lock().await.save(&self.config.cache_path) {
            tracing::error!("failed to persist progress cache: {}", e);
        }
    }
}
