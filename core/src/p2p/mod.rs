pub mod handshake;
pub mod message;
pub mod outbound;
pub mod inbound;

pub type Result<T> = std::result::Result<T, PeerError>;

#[derive(thiserror::Error, Debug)]
pub enum PeerError {

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("handshake provided incorrect protocol")]
    IncorrectProtocol,

    #[error("handshake provided incorrect info hash")]
    InfoHashMismatch,

    #[error("no handshake received")]
    NoHandshake,

    #[error("invalid message id: {0}")]
    InvalidMessageId(u8),

    #[error("bitfield sent before handshake")]
    UnexpectedBitfield,

    #[error("invalid message payload")]
    InvalidMessage,

    #[error("piece failed sha-1 verification")]
    IntegrityError,

    #[error("connection timeout")]
    Timeout,
}
