use std::{net::SocketAddrV4, time::Duration};
use futures::{SinkExt, StreamExt};
use sha1::Digest;
use tokio::{net::TcpStream, time};
use tokio_util::codec::Framed;
use crate::{
    bitfield::{Bitfield, BitfieldExt},
    block::{block_len, BlockInfo},
    work::{WorkItem, WorkQueue},
    BLOCK_SIZE,
};
use super::{
    handshake::{Handshake, HandshakeCodec, PROTOCOL},
    message::{Message, MessageCodec},
    PeerError, Result,
};

const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);
const BITFIELD_TIMEOUT: Duration = Duration::from_secs(5);
const PIECE_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_BACKLOG: usize = 5;

pub struct PieceResult {
    pub index: usize,
    pub data: Vec<u8>,
}

pub type ResultsTx = tokio::sync::mpsc::UnboundedSender<PieceResult>;

// Runs one outbound connection against `addr`, pulling work from the
// shared queue until it is exhausted, cancellation fires, or the
// connection fails. A piece in flight when the worker fails is returned
// to the queue so a healthy worker can pick it up.
#[tracing::instrument(skip(info_hash, peer_id, queue, results_tx, cancel), fields(peer = %addr))]
pub async fn run(
    addr: SocketAddrV4,
    info_hash: [u8; 20],
    peer_id: [u8; 20],
    queue: WorkQueue,
    results_tx: ResultsTx,
    mut cancel: tokio::sync::watch::Receiver<bool>,
) -> Result<()> {

    let stream = time::timeout(HANDSHAKE_TIMEOUT, TcpStream::connect(std::net::SocketAddr::V4(addr)))
        .await
        .map_err(|_| PeerError::Timeout)??;

    let mut handshake_socket = Framed::new(stream, HandshakeCodec);
    time::timeout(HANDSHAKE_TIMEOUT, handshake_socket.send(Handshake::new(info_hash, peer_id)))
        .await
        .map_err(|_| PeerError::Timeout)??;

    let handshake = time::timeout(HANDSHAKE_TIMEOUT, handshake_socket.next())
        .await
        .map_err(|_| PeerError::Timeout)?
        .ok_or(PeerError::NoHandshake)??;

    if handshake.protocol != PROTOCOL {
        return Err(PeerError::IncorrectProtocol);
    }
    if handshake.info_hash != info_hash {
        return Err(PeerError::InfoHashMismatch);
    }

    let mut socket = Framed::new(handshake_socket.into_inner(), MessageCodec);

    let msg = time::timeout(BITFIELD_TIMEOUT, socket.next())
        .await
        .map_err(|_| PeerError::Timeout)?
        .ok_or(PeerError::NoHandshake)??;
    let mut remote_bitfield = match msg {
        Message::Bitfield(bf) => bf,
        _ => return Err(PeerError::UnexpectedBitfield),
    };

    let mut choked = true;
    socket.send(Message::Interested).await?;
    tracing::info!("connected, peer advertises {} pieces", remote_bitfield.popcount());

    loop {
        let work = tokio::select! {
            work = queue.pop() => work,
            _ = cancel.changed() => None,
        };
        let Some(work) = work else { break };

        if *cancel.borrow() {
            queue.push_back(work).await;
            break;
        }

        if !remote_bitfield.has(work.index) {
            queue.push_back(work).await;
            continue;
        }

        match download_piece(&mut socket, &mut choked, &mut remote_bitfield, work).await {
            Ok(data) => {
                socket.send(Message::Have { idx: work.index as u32 }).await.ok();
                if results_tx.send(PieceResult { index: work.index, data }).is_err() {
                    break;
                }
            }
            Err(e) => {
                tracing::warn!("piece {} failed: {}", work.index, e);
                queue.push_back(work).await;
                socket.send(Message::NotInterested).await.ok();
                return Err(e);
            }
        }
    }

    socket.send(Message::NotInterested).await.ok();
    Ok(())
}

async fn download_piece(
    socket: &mut Framed<TcpStream, MessageCodec>,
    choked: &mut bool,
    remote_bitfield: &mut Bitfield,
    work: WorkItem,
) -> Result<Vec<u8>> {

    let mut buf = vec![0u8; work.length];
    let mut downloaded = 0usize;
    let mut requested = 0usize;
    let mut backlog = 0usize;
    let deadline = time::Instant::now() + PIECE_TIMEOUT;

    while downloaded < work.length {

        while !*choked && backlog < MAX_BACKLOG && requested < work.length {
            let len = block_len(work.length, requested / BLOCK_SIZE);
            socket.send(Message::Request(BlockInfo {
                piece_idx: work.index,
                offset: requested,
                len,
            })).await?;
            requested += len;
            backlog += 1;
        }

        let remaining = deadline.saturating_duration_since(time::Instant::now());
        if remaining.is_zero() {
            return Err(PeerError::Timeout);
        }

        let msg = time::timeout(remaining, socket.next())
            .await
            .map_err(|_| PeerError::Timeout)?
            .ok_or(PeerError::Timeout)??;

        match msg {
            Message::Unchoke => *choked = false,
            Message::Choke => *choked = true,
            Message::Have { idx } => {
                if (idx as usize) < remote_bitfield.len() {
                    remote_bitfield.set(idx as usize);
                }
            },
            Message::Piece(block) => {
                if block.piece_idx != work.index {
                    continue;
                }
                let end = block.offset + block.data.len();
                if end > buf.len() {
                    return Err(PeerError::InvalidMessage);
                }
                buf[block.offset..end].copy_from_slice(&block.data);
                downloaded += block.data.len();
                backlog = backlog.saturating_sub(1);
            },
            Message::KeepAlive => {},
            _ => {},
        }
    }

    let mut hasher = sha1::Sha1::new();
    hasher.update(&buf);
    let hash: [u8; 20] = hasher.finalize().into();
    if hash != work.hash {
        return Err(PeerError::IntegrityError);
    }

    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backlog_is_filled_in_block_size_steps() {
        // block_len is exercised directly elsewhere; this just checks the
        // pipelining math used above stays a whole number of blocks until
        // the final, possibly-shorter one.
        let piece_len = BLOCK_SIZE * 3 + 100;
        let mut requested = 0;
        let mut steps = Vec::new();
        while requested < piece_len {
            let len = block_len(piece_len, requested / BLOCK_SIZE);
            steps.push(len);
            requested += len;
        }
        assert_eq!(steps, vec![BLOCK_SIZE, BLOCK_SIZE, BLOCK_SIZE, 100]);
    }
}
