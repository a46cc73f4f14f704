use ssh_packet::{trans::KexInit, Id};
use strum::{AsRefStr, EnumString};

use crate::{
    algorithm::{cipher, compress, hmac},
    kex::KexIo,
    stream::Pipe,
    transport::{Transport, TransportPair},
    Error, Result,
};

mod curve25519;

pub fn negociate(clientkex: &KexInit, serverkex: &KexInit) -> Result<Kex> {
    clientkex
        .kex_algorithms
        .preferred_in(&serverkex.kex_algorithms)
        .ok_or(Error::NoCommonKex)?
        .parse()
        .map_err(|_| Error::UnsupportedAlgorithm)
}

// TODO: (feature) Implement the following legacy key-exchange methods (`diffie-hellman-group14-sha256`, `diffie-hellman-group14-sha1`, `diffie-hellman-group1-sha1`).

/// SSH key-exchange algorithms.
///
/// The transport only *drives* the exchange named here; the arithmetic that
/// backs each variant lives in the `curve25519` submodule (and, eventually,
/// its siblings).
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, EnumString, AsRefStr)]
#[strum(serialize_all = "kebab-case")]
pub enum Kex {
    /// Curve25519 ECDH with sha-2-256 digest.
    Curve25519Sha256,

    /// Curve25519 ECDH with sha-2-256 digest (pre-RFC 8731).
    #[strum(serialize = "curve25519-sha256@libssh.org")]
    Curve25519Sha256Libssh,
    //
    // DiffieHellmanGroup14Sha256,
    //
    // DiffieHellmanGroup14Sha1,
    //
    // DiffieHellmanGroup1Sha1,
}

impl Kex {
    /// Run this key-exchange algorithm as the client, producing the transport
    /// pair to install once `NEWKEYS` has been sent and received. The caller
    /// (`crate::kex::KeyExchanger`) installs `tx`/`rx` independently at their
    /// respective `NEWKEYS` boundary rather than atomically — see invariant
    /// I3.
    #[allow(clippy::too_many_arguments)]
    pub(crate) async fn as_client(
        &self,
        io: &mut KexIo<'_, impl Pipe>,
        v_c: &Id,
        v_s: &str,
        i_c: &KexInit<'_>,
        i_s: &KexInit<'_>,
        host_key: &mut dyn FnMut(&ssh_key::PublicKey) -> bool,
    ) -> Result<TransportPair> {
        let (client_hmac, server_hmac) = hmac::negociate(i_c, i_s)?;
        let (client_compress, server_compress) = compress::negociate(i_c, i_s)?;
        let (client_cipher, server_cipher) = cipher::negociate(i_c, i_s)?;

        let (session_id, client_keys, server_keys) = match self {
            Self::Curve25519Sha256 | Self::Curve25519Sha256Libssh => {
                curve25519::as_client::<sha2::Sha256>(
                    io,
                    v_c,
                    v_s,
                    i_c,
                    i_s,
                    &client_cipher,
                    &server_cipher,
                    &client_hmac,
                    &server_hmac,
                    host_key,
                )
                .await?
            }
        };

        Ok(TransportPair {
            session_id,
            tx: Transport {
                compress: client_compress,
                cipher: client_cipher,
                hmac: client_hmac,
                state: None,
                chain: client_keys,
            },
            rx: Transport {
                compress: server_compress,
                cipher: server_cipher,
                hmac: server_hmac,
                state: None,
                chain: server_keys,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kex_parses_both_spellings() {
        assert_eq!(
            "curve25519-sha256".parse::<Kex>().unwrap(),
            Kex::Curve25519Sha256
        );
        assert_eq!(
            "curve25519-sha256@libssh.org".parse::<Kex>().unwrap(),
            Kex::Curve25519Sha256Libssh
        );
        assert!("diffie-hellman-group14-sha256".parse::<Kex>().is_err());
    }
}
