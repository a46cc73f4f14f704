//! Client-side session configuration: identification string, algorithm
//! preferences, and the timeouts governing handshakes and idle connections.

use std::time::Duration;

use rand::RngCore;
use ssh_packet::{arch::NameList, trans::KexInit};

use crate::algorithm::{Cipher, Compress, Hmac, Key, Kex};

#[doc(no_inline)]
pub use ssh_packet::Id;

/// Configuration for a client-side [`crate::Session`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Identification string sent to the peer during version exchange.
    pub id: Id,

    /// Timeout applied to the version exchange, each key-exchange step, and
    /// `reqService`.
    pub timeout: Duration,

    /// Interval at which `SSH_MSG_IGNORE` heartbeats are sent; `Duration::ZERO`
    /// disables the heartbeater.
    pub heartbeat: Duration,

    /// The algorithms this client is willing to negotiate, most preferred first.
    pub algorithms: Algorithms,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            id: Id::v2(
                concat!(env!("CARGO_PKG_NAME"), "@client:", env!("CARGO_PKG_VERSION")),
                None::<&str>,
            ),
            timeout: Duration::from_secs(30),
            heartbeat: Duration::from_secs(0),
            algorithms: Default::default(),
        }
    }
}

impl ClientConfig {
    /// Build the `SSH_MSG_KEXINIT` this client proposes, from the current
    /// algorithm preferences.
    pub(crate) fn kexinit(&self) -> KexInit<'static> {
        let mut cookie = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut cookie);

        KexInit {
            cookie,
            kex_algorithms: NameList::from_iter(&self.algorithms.kexs),
            server_host_key_algorithms: NameList::from_iter(&self.algorithms.keys),
            encryption_algorithms_client_to_server: NameList::from_iter(&self.algorithms.ciphers),
            encryption_algorithms_server_to_client: NameList::from_iter(&self.algorithms.ciphers),
            mac_algorithms_client_to_server: NameList::from_iter(&self.algorithms.macs),
            mac_algorithms_server_to_client: NameList::from_iter(&self.algorithms.macs),
            compression_algorithms_client_to_server: NameList::from_iter(
                &self.algorithms.compressions,
            ),
            compression_algorithms_server_to_client: NameList::from_iter(
                &self.algorithms.compressions,
            ),
            languages_client_to_server: Default::default(),
            languages_server_to_client: Default::default(),
            first_kex_packet_follows: false.into(),
        }
    }
}

/// Algorithm preference lists for a client-side session, most preferred
/// first within each list.
#[derive(Debug, Clone)]
pub struct Algorithms {
    /// Enabled key-exchange algorithms.
    pub kexs: Vec<Kex>,

    /// Accepted server host-key algorithms.
    pub keys: Vec<Key>,

    /// Enabled cipher algorithms.
    pub ciphers: Vec<Cipher>,

    /// Enabled MAC algorithms.
    pub macs: Vec<Hmac>,

    /// Enabled compression algorithms.
    pub compressions: Vec<Compress>,
}

impl Default for Algorithms {
    fn default() -> Self {
        Self {
            kexs: vec![Kex::Curve25519Sha256, Kex::Curve25519Sha256Libssh],
            keys: vec![
                Key::Ed25519,
                Key::Ecdsa {
                    curve: ssh_key::EcdsaCurve::NistP384,
                },
                Key::Ecdsa {
                    curve: ssh_key::EcdsaCurve::NistP256,
                },
                Key::Rsa {
                    hash: Some(ssh_key::HashAlg::Sha512),
                },
                Key::Rsa {
                    hash: Some(ssh_key::HashAlg::Sha256),
                },
                Key::Rsa { hash: None },
                Key::Dsa,
            ],
            ciphers: vec![
                Cipher::Aes256Ctr,
                Cipher::Aes192Ctr,
                Cipher::Aes128Ctr,
                Cipher::Aes256Cbc,
                Cipher::Aes192Cbc,
                Cipher::Aes128Cbc,
                Cipher::TDesCbc,
            ],
            macs: vec![
                Hmac::HmacSha512ETM,
                Hmac::HmacSha256ETM,
                Hmac::HmacSha512,
                Hmac::HmacSha256,
                Hmac::HmacSha1ETM,
                Hmac::HmacSha1,
                Hmac::HmacMd5ETM,
                Hmac::HmacMd5,
            ],
            compressions: vec![Compress::ZlibOpenssh, Compress::Zlib, Compress::None],
        }
    }
}
