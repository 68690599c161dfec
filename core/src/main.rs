use std::{path::PathBuf, sync::Arc};
use clap::{Parser, Subcommand};
use rand::Rng;
use swarmcore::{Config, Event, MetaInfo, Supervisor};

const DEFAULT_PORT: u16 = 6881;
const GENERATED_PIECE_LENGTH: u32 = 256 * 1024;

#[derive(Parser)]
#[command(name = "swarmcore", about = "A BitTorrent peer runtime")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {

    // Start the peer runtime, seeding and/or leeching the given torrents.
    Start {
        #[arg(long, default_value_t = DEFAULT_PORT)]
        port: u16,

        // Announce URL used only when generating a fresh metainfo to seed.
        #[arg(long)]
        tracker: Option<url::Url>,

        #[arg(long = "seed")]
        seed: Vec<PathBuf>,

        #[arg(long = "leech")]
        leech: Vec<PathBuf>,

        #[arg(long, default_value = ".")]
        output_dir: PathBuf,
    },

    // Query a torrent catalog and print what it has available.
    List {
        #[arg(long)]
        catalog: url::Url,
    },
}

#[tokio::main]
async fn main() {

    let format = tracing_subscriber::fmt::format();
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .event_format(format)
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("sets the global tracing subscriber");

    let cli = Cli::parse();

    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("failed to load configuration: {}", e);
            return;
        },
    };

    match cli.command {
        Command::Start { port, tracker, seed, leech, output_dir } => {
            run_start(config, port, tracker, seed, leech, output_dir).await;
        },
        Command::List { catalog } => {
            run_list(catalog).await;
        },
    }
}

async fn run_start(
    config: Config,
    port: u16,
    tracker_override: Option<url::Url>,
    seed: Vec<PathBuf>,
    leech: Vec<PathBuf>,
    output_dir: PathBuf,
) {
    let peer_id = generate_peer_id();

    let supervisor = match Supervisor::new(peer_id, port, config) {
        Ok(supervisor) => Arc::new(supervisor),
        Err(e) => {
            tracing::error!("failed to start supervisor: {}", e);
            return;
        },
    };

    let events = supervisor.events();

    for path in seed {
        let metainfo = match generate_metainfo(&path, tracker_override.as_ref()) {
            Some(metainfo) => metainfo,
            None => continue,
        };
        events.send(Event::Upload { metainfo, file_path: path }).ok();
    }

    for path in leech {
        let metainfo = match load_metainfo(&path) {
            Some(metainfo) => metainfo,
            None => continue,
        };
        events.send(Event::Download { metainfo, output_dir: output_dir.clone() }).ok();
    }

    let shutdown = supervisor.shutdown_handle();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        tracing::info!("received shutdown signal");
        shutdown.send(true).ok();
    });

    if let Err(e) = supervisor.run().await {
        tracing::error!("supervisor exited with error: {}", e);
    }
}

async fn run_list(catalog: url::Url) {
    match reqwest::get(catalog.clone()).await {
        Ok(response) => match response.text().await {
            Ok(body) => println!("{}", body),
            Err(e) => tracing::error!("failed to read catalog response: {}", e),
        },
        Err(e) => tracing::error!("failed to query catalog at {}: {}", catalog, e),
    }
}

fn load_metainfo(path: &PathBuf) -> Option<MetaInfo> {
    match MetaInfo::new(path) {
        Ok(metainfo) => Some(metainfo),
        Err(e) => {
            tracing::error!("failed to load {}: {}", path.display(), e);
            None
        },
    }
}

// A `--seed FILE` names a plain data file, not a `.torrent`; we generate a
// fresh metainfo for it using the announce URL the user supplied.
fn generate_metainfo(path: &PathBuf, tracker_override: Option<&url::Url>) -> Option<MetaInfo> {
    let Some(announce) = tracker_override.cloned() else {
        tracing::error!("--tracker is required when --seed names a raw file ({})", path.display());
        return None;
    };

    match MetaInfo::from_file(path, announce, GENERATED_PIECE_LENGTH) {
        Ok(metainfo) => Some(metainfo),
        Err(e) => {
            tracing::error!("failed to generate metainfo for {}: {}", path.display(), e);
            None
        },
    }
}

fn generate_peer_id() -> [u8; 20] {
    let mut id = *b"-SC0001-000000000000";
    rand::thread_rng().fill(&mut id[8..]);
    id
}
