//! Collection of error handling types and aliases.

use ssh_packet::trans;
use thiserror::Error;

pub use ssh_packet::trans::DisconnectReason;

/// The disconnection side for [`DisconnectedError`].
#[derive(Debug, Clone)]
pub enum DisconnectedBy {
    /// The session has been disconnected by _us_.
    Us,

    /// The session has been disconnected by _them_.
    Them,
}

/// The error type describing disconnect.
#[must_use]
#[derive(Debug, Error, Clone)]
#[error("The session has been disconnected by {by:?} for {reason:?}: {description}")]
pub struct DisconnectedError {
    /// Side that sent the disconnect message.
    pub by: DisconnectedBy,

    /// Reason for disconnect.
    pub reason: trans::DisconnectReason,

    /// Description of the disconnect reason.
    pub description: String,
}

/// The error types that can occur when manipulating this crate.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum Error {
    /// Identifier parsing error.
    #[error(transparent)]
    Id(#[from] ssh_packet::Error),

    /// I/O Error.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Binary (de)-serialization error.
    #[error(transparent)]
    Binary(#[from] ssh_packet::binrw::Error),

    /// SSH Key error.
    #[error(transparent)]
    Key(#[from] ssh_key::Error),

    /// Packet integrity error.
    #[error(transparent)]
    Integrity(#[from] digest::MacError),

    /// Signature error during the key-exchange.
    #[error(transparent)]
    Signature(#[from] signature::Error),

    /// No common kex algorithm found between both sides.
    #[error("Unable to negociate a common kex algorithm")]
    NoCommonKex,

    /// No common key algorithm found between both sides.
    #[error("Unable to negociate a common host key algorithm")]
    NoCommonKey,

    /// No common cipher algorithm found between both sides.
    #[error("Unable to negociate a common encryption algorithm")]
    NoCommonCipher,

    /// No common hmac algorithm found between both sides.
    #[error("Unable to negociate a common HMAC algorithm")]
    NoCommonHmac,

    /// No common compression algorithm found between both sides.
    #[error("Unable to negociate a common compression algorithm")]
    NoCommonCompression,

    /// A name-list entry parsed to an algorithm this crate does not implement.
    #[error("Received algorithm is unsupported")]
    UnsupportedAlgorithm,

    /// Protocol error in the key-exchange.
    #[error("Error in the kex-exchange algorithm")]
    KexError,

    /// The host key presented by the peer was rejected by every registered verifier.
    #[error("The host key could not be verified")]
    HostKeyNotVerifiable,

    /// Error while encrypting or decrypting messages.
    #[error("The cipher ended up in an error")]
    Cipher,

    /// A packet announced a `packet_length` outside the accepted range.
    #[error("Received packet length {0} is out of the accepted range")]
    PacketLength(u32),

    /// The peer's identification line did not start with `SSH-2.0-` or
    /// `SSH-1.99-`.
    #[error("Peer's identification string is not supported: {0}")]
    UnsupportedVersion(String),

    /// The identification exchange violated the framing rules of RFC 4253
    /// §4.2: a bare LF, an oversized line, or an oversized MOTD header.
    #[error("Identification exchange violated framing rules: {0}")]
    BannerFraming(String),

    /// The message received was unexpected in the current context.
    #[error("Peer sent a message that made no sense in the current context")]
    UnexpectedMessage,

    /// A blocking operation did not complete within the configured timeout.
    #[error("Operation timed out")]
    Timeout,

    /// The session has been disconnected.
    #[error(transparent)]
    Disconnected(#[from] DisconnectedError),
}

impl Error {
    /// The [`DisconnectReason`] that best describes this error, for use when
    /// emitting a best-effort `SSH_MSG_DISCONNECT` before tearing the session down.
    ///
    /// Returns `None` for errors that should not generate an outbound disconnect
    /// (e.g. the peer already told us why it's leaving).
    pub fn disconnect_reason(&self) -> Option<DisconnectReason> {
        match self {
            Self::Disconnected(_) => None,
            Self::Io(_) => Some(DisconnectReason::ConnectionLost),
            Self::Integrity(_) => Some(DisconnectReason::MacError),
            Self::PacketLength(_)
            | Self::UnexpectedMessage
            | Self::Id(_)
            | Self::Binary(_)
            | Self::BannerFraming(_) => Some(DisconnectReason::ProtocolError),
            Self::UnsupportedVersion(_) => Some(DisconnectReason::ProtocolVersionNotSupported),
            Self::NoCommonKex
            | Self::NoCommonCipher
            | Self::NoCommonHmac
            | Self::NoCommonCompression
            | Self::KexError
            | Self::Signature(_) => Some(DisconnectReason::KeyExchangeFailed),
            Self::NoCommonKey | Self::UnsupportedAlgorithm => {
                Some(DisconnectReason::KeyExchangeFailed)
            }
            Self::HostKeyNotVerifiable => Some(DisconnectReason::HostKeyNotVerifiable),
            Self::Key(_) | Self::Cipher => Some(DisconnectReason::KeyExchangeFailed),
            Self::Timeout => Some(DisconnectReason::ConnectionLost),
        }
    }
}

/// A handy [`std::result::Result`] type alias bounding the [`enum@Error`] struct as `E`.
pub type Result<T, E = Error> = std::result::Result<T, E>;
