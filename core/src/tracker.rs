use std::{
    net::{Ipv4Addr, SocketAddrV4},
    time::Duration,
};
use bytes::Buf;
use serde::de;
use serde_derive::Deserialize;
use url::Url;

const ANNOUNCE_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(thiserror::Error, Debug)]
pub enum TrackerError {

    #[error("request error: {0}")]
    ReqwestError(#[from] reqwest::Error),

    #[error("error deserializing response: {0}")]
    BencodeError(#[from] bencode::Error),

    #[error("tracker announce timed out")]
    Timeout,

    #[error("tracker returned failure: {0}")]
    ResponseError(String),

    #[error("tracker's compact peer string was not a multiple of 6 bytes")]
    MalformedPeers,

}

pub type Result<T> = std::result::Result<T, TrackerError>;

#[derive(Clone, Debug, Copy, PartialEq, Eq)]
pub enum Event {
    Started,
    Completed,
    Stopped,
}

impl std::fmt::Display for Event {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Event::Started => write!(f, "started"),
            Event::Completed => write!(f, "completed"),
            Event::Stopped => write!(f, "stopped"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AnnounceParams {

    pub info_hash: [u8; 20],

    pub peer_id: [u8; 20],

    pub port: u16,

    pub uploaded: u64,

    pub downloaded: u64,

    pub left: u64,

    // None when this is a periodic keep-alive announce.
    pub event: Option<Event>,

}

#[derive(Debug)]
pub struct AnnounceResponse {

    // The tracker in this system reports its interval in minutes, not
    // seconds; callers must multiply by 60 before sleeping on it.
    pub interval_minutes: u64,

    pub peers: Vec<SocketAddrV4>,

}

// A single tracker endpoint announced to over HTTP. Only one tier member is
// tracked at a time by callers; tiers/fallback ordering live in the caller.
#[derive(Debug, Clone)]
pub struct Tracker {

    client: reqwest::Client,

    pub url: Url,

}

impl Tracker {

    pub fn new(url: Url) -> Self {
        Self {
            client: reqwest::Client::new(),
            url,
        }
    }

    pub async fn announce(&self, params: AnnounceParams) -> Result<AnnounceResponse> {

        let mut url = format!(
            "{}?info_hash={}&peer_id={}&port={}&uploaded={}&downloaded={}&left={}&compact=1",
            self.url.as_str(),
            urlencoding::encode_binary(&params.info_hash),
            urlencoding::encode_binary(&params.peer_id),
            params.port,
            params.uploaded,
            params.downloaded,
            params.left,
        );
        if let Some(event) = params.event {
            url.push_str(&format!("&event={}", event));
        }
        tracing::debug!("announce url: {}", url);

        let raw_resp = tokio::time::timeout(ANNOUNCE_TIMEOUT, async {
            self.client.get(&url).send().await?.bytes().await
        })
            .await
            .map_err(|_| TrackerError::Timeout)??;

        let resp: HttpResponse = bencode::decode_bytes(&raw_resp)?;
        tracing::debug!("announce response: {:#?}", resp);

        if let Some(failure) = resp.failure_reason {
            return Err(TrackerError::ResponseError(failure));
        }
        if let Some(warning) = resp.warning_message {
            tracing::warn!("tracker warning: {}", warning);
        }

        Ok(AnnounceResponse {
            interval_minutes: resp.interval.unwrap_or(30),
            peers: resp.peers.into_peers()?,
        })
    }
}

#[derive(Deserialize, Debug, Default)]
struct HttpResponse {

    #[serde(rename = "failure reason")]
    failure_reason: Option<String>,

    #[serde(rename = "warning message")]
    warning_message: Option<String>,

    // Minutes, per this system's tracker contract (see the peer's announce loop).
    interval: Option<u64>,

    #[serde(default)]
    #[serde(deserialize_with = "peer_deserialize")]
    peers: PeersField,
}

// The raw shape the tracker sent peers in. The compact byte string's
// length isn't validated here: doing that inside the `Deserialize` impl
// would only ever surface as a generic bencode error, burying the
// `MalformedPeers` kind the rest of this system's error taxonomy expects.
// `into_peers` does that validation instead, once `announce` actually
// has a `TrackerError` to return.
#[derive(Debug)]
enum PeersField {
    Compact(Vec<u8>),
    List(Vec<SocketAddrV4>),
}

impl Default for PeersField {
    fn default() -> Self {
        PeersField::List(Vec::new())
    }
}

impl PeersField {
    fn into_peers(self) -> Result<Vec<SocketAddrV4>> {
        match self {
            PeersField::List(peers) => Ok(peers),
            PeersField::Compact(bytes) => {
                if bytes.len() % 6 != 0 {
                    return Err(TrackerError::MalformedPeers);
                }
                let mut buf = &bytes[..];
                let num_peers = buf.len() / 6;
                let mut peers = Vec::with_capacity(num_peers);
                for _ in 0..num_peers {
                    peers.push(SocketAddrV4::new(Ipv4Addr::from(buf.get_u32()), buf.get_u16()));
                }
                Ok(peers)
            },
        }
    }
}

// The tracker can return either a compact byte string or a list of
// dictionaries, regardless of whether compact=1 was requested. IPv6 peers
// are dropped (logged) rather than represented; this client only dials v4.
fn peer_deserialize<'de, D>(deserializer: D) -> std::result::Result<PeersField, D::Error>
where
    D: serde::Deserializer<'de>,
{
    struct PeerVisitor;

    impl<'de> de::Visitor<'de> for PeerVisitor {

        type Value = PeersField;

        fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
            formatter.write_str("a string of bytes or a list of dictionaries")
        }

        fn visit_bytes<E>(self, v: &[u8]) -> std::result::Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(PeersField::Compact(v.to_vec()))
        }

        fn visit_seq<A>(self, mut seq: A) -> std::result::Result<Self::Value, A::Error>
        where
            A: de::SeqAccess<'de>,
        {
            #[derive(Deserialize)]
            struct PeerItem {
                ip: String,
                port: u16,
            }

            let mut peers = Vec::new();
            while let Some(peer) = seq.next_element::<PeerItem>()? {
                match peer.ip.parse::<Ipv4Addr>() {
                    Ok(ip) => peers.push(SocketAddrV4::new(ip, peer.port)),
                    Err(_) => tracing::warn!("dropping non-ipv4 tracker peer: {}", peer.ip),
                }
            }

            Ok(PeersField::List(peers))
        }
    }

    deserializer.deserialize_any(PeerVisitor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn parse_response_binary_peers() {
        let s = "64383a636f6d706c65746569396531303a696e636f6d706c657465693165383a696e74657276616c69313830306531323a6d696e20696e74657276616c693138303065353a706565727336303a52454d051ae1ca2f2a2ec00884937726decc61759ab8138851ab05e8f6bb5062f69770469247493ad4d005879f2ec8d54237ce44ea6043db8806c8d565";
        let response: HttpResponse = bencode::decode_bytes(&hex::decode(s).unwrap()).unwrap();
        let peers = response.peers.into_peers().unwrap();
        assert_eq!(response.interval, Some(1800));
        assert!(peers.contains(&SocketAddrV4::new(Ipv4Addr::new(97, 117, 154, 184), 5000)));
        assert!(peers.contains(&SocketAddrV4::new(Ipv4Addr::new(5, 135, 159, 46), 51413)));
    }

    #[test]
    fn failure_reason_short_circuits_peer_parsing() {
        // A minimal dictionary containing only a failure reason.
        let encoded = b"d14:failure reason9:no such torrente";
        let response: HttpResponse = bencode::decode_bytes(encoded).unwrap();
        assert_eq!(response.failure_reason.as_deref(), Some("no such torrent"));
        assert!(response.peers.into_peers().unwrap().is_empty());
    }

    #[test]
    fn compact_peers_not_a_multiple_of_6_is_malformed_peers() {
        let field = PeersField::Compact(vec![0u8; 7]);
        match field.into_peers() {
            Err(TrackerError::MalformedPeers) => {},
            other => panic!("expected MalformedPeers, got {:?}", other),
        }
    }
}
