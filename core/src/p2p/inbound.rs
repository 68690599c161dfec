use std::{collections::HashMap, net::SocketAddr, sync::Arc, time::Duration};
use futures::{SinkExt, StreamExt};
use sha1::Digest;
use tokio::{net::TcpStream, sync::RwLock, time};
use tokio_util::codec::Framed;
use crate::{
    bitfield::{Bitfield, BitfieldExt},
    block::BlockData,
    fs::SeedStore,
};
use super::{
    handshake::{Handshake, HandshakeCodec, PROTOCOL},
    message::{Message, MessageCodec},
    PeerError, Result,
};

const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);
const IDLE_TIMEOUT: Duration = Duration::from_secs(120);

// What an inbound connection needs to know about one torrent being seeded.
#[derive(Clone)]
pub struct SeedEntry {
    pub store: Arc<SeedStore>,
    pub piece_len: usize,
    pub total_len: u64,
}

// Shared by every inbound connection; the supervisor inserts an entry
// for each torrent it seeds and removes it when seeding stops.
pub type SeedTable = Arc<RwLock<HashMap<[u8; 20], SeedEntry>>>;

fn sentinel_info_hash() -> [u8; 20] {
    let mut hasher = sha1::Sha1::new();
    hasher.update(b"invalid infohash");
    hasher.finalize().into()
}

fn num_pieces_of(total_len: u64, piece_len: usize) -> usize {
    ((total_len + piece_len as u64 - 1) / piece_len as u64) as usize
}

fn piece_len_at(total_len: u64, piece_len: usize, idx: usize, total_pieces: usize) -> usize {
    if idx + 1 == total_pieces {
        (total_len - idx as u64 * piece_len as u64) as usize
    } else {
        piece_len
    }
}

// Services one inbound connection: handshake, bitfield, then a service
// loop answering INTERESTED/REQUEST/HAVE until the peer goes idle or
// disconnects. A handshake for a torrent we aren't seeding gets a
// sentinel info-hash back and the connection is closed.
#[tracing::instrument(skip(stream, local_peer_id, seeds), fields(peer = %peer_addr))]
pub async fn run(
    stream: TcpStream,
    peer_addr: SocketAddr,
    local_peer_id: [u8; 20],
    seeds: SeedTable,
) -> Result<()> {

    let mut handshake_socket = Framed::new(stream, HandshakeCodec);

    let handshake = time::timeout(HANDSHAKE_TIMEOUT, handshake_socket.next())
        .await
        .map_err(|_| PeerError::Timeout)?
        .ok_or(PeerError::NoHandshake)??;

    if handshake.protocol != PROTOCOL {
        return Err(PeerError::IncorrectProtocol);
    }

    let entry = seeds.read().await.get(&handshake.info_hash).cloned();

    let Some(entry) = entry else {
        tracing::warn!("inbound handshake for a torrent we don't seed");
        handshake_socket
            .send(Handshake::new(sentinel_info_hash(), local_peer_id))
            .await
            .ok();
        return Ok(());
    };

    time::timeout(
        HANDSHAKE_TIMEOUT,
        handshake_socket.send(Handshake::new(handshake.info_hash, local_peer_id)),
    )
        .await
        .map_err(|_| PeerError::Timeout)??;

    let mut socket = Framed::new(handshake_socket.into_inner(), MessageCodec);

    let total_pieces = num_pieces_of(entry.total_len, entry.piece_len);
    let mut bitfield = Bitfield::new_of_bits(total_pieces);
    for i in 0..total_pieces {
        bitfield.set(i);
    }
    socket.send(Message::Bitfield(bitfield)).await?;

    let mut interested = false;

    loop {
        let msg = match time::timeout(IDLE_TIMEOUT, socket.next()).await {
            Ok(Some(msg)) => msg?,
            Ok(None) => break,
            Err(_) => break,
        };

        match msg {
            Message::Interested => {
                interested = true;
                socket.send(Message::Unchoke).await?;
            },
            Message::NotInterested => interested = false,
            Message::Have { .. } => {},
            Message::Request(block) => {
                if !interested || block.piece_idx >= total_pieces {
                    continue;
                }
                let piece_len = piece_len_at(entry.total_len, entry.piece_len, block.piece_idx, total_pieces);
                if block.offset + block.len > piece_len {
                    continue;
                }
                let piece_offset = block.piece_idx as u64 * entry.piece_len as u64;
                match entry.store.read_block(block.piece_idx, piece_offset, piece_len, block.offset, block.len).await {
                    Ok(data) => {
                        socket.send(Message::Piece(BlockData {
                            piece_idx: block.piece_idx,
                            offset: block.offset,
                            data,
                        })).await?;
                    },
                    Err(e) => tracing::warn!("failed to read piece {}: {}", block.piece_idx, e),
                }
            },
            Message::Cancel(_) | Message::KeepAlive => {},
            _ => {},
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn num_pieces_rounds_up_for_a_short_last_piece() {
        assert_eq!(num_pieces_of(25, 10), 3);
    }

    #[test]
    fn piece_len_at_reports_the_remainder_for_the_last_piece() {
        assert_eq!(piece_len_at(25, 10, 0, 3), 10);
        assert_eq!(piece_len_at(25, 10, 2, 3), 5);
    }
}
