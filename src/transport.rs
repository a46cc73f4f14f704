//! The per-direction algorithm state negotiated by a key-exchange: cipher,
//! hmac, compression and the keys derived from the shared secret.

use rand::Rng;
use secrecy::ExposeSecret;
use ssh_packet::trans::KexInit;

use crate::{
    algorithm::{self, Cipher, CipherState},
    Result,
};

mod keys;
pub use keys::Keys;

/// Minimum size of an unencrypted SSH binary packet, per RFC 4253 §6.
pub(crate) const MIN_PACKET_SIZE: usize = 16;

/// The pair of [`Transport`]s negotiated by a single key-exchange, one per
/// direction, plus the session identifier established (or re-confirmed) by
/// that exchange.
///
/// `tx` and `rx` are installed into the [`crate::codec::Encoder`] and
/// [`crate::codec::Decoder`] **independently**, at their respective
/// `NEWKEYS` boundary — never atomically — per invariant I3.
#[derive(Debug)]
pub struct TransportPair {
    /// The exchange hash of the kex that produced this pair.
    ///
    /// Only the *first* kex's hash becomes the session identifier (I5); on
    /// a rekey this field still carries the new exchange hash, but the
    /// supervisor ignores it in favour of the frozen session identifier.
    pub session_id: Vec<u8>,

    /// Outbound (client-to-server) transport state.
    pub tx: Transport,

    /// Inbound (server-to-client) transport state.
    pub rx: Transport,
}

/// Per-direction cipher/hmac/compression state, as negotiated by the kex.
#[derive(Debug, Default)]
pub struct Transport {
    pub compress: algorithm::Compress,
    pub cipher: algorithm::Cipher,
    pub hmac: algorithm::Hmac,

    pub state: Option<CipherState>,
    pub chain: Keys,

    /// Whether a `delayed`-mode compression algorithm (`zlib@openssh.com`)
    /// has been released to run. Until then it behaves as `none` — see
    /// [`Self::enable_delayed`].
    delayed: bool,
}

impl Transport {
    /// Negotiate the `none`-everything transport used before the first kex
    /// completes (and momentarily while a rekey is in flight on the side
    /// that hasn't reached `NEWKEYS` yet).
    pub fn none() -> Self {
        Self::default()
    }

    pub fn block_size(&self) -> usize {
        self.cipher.block_size()
    }

    pub fn mac_size(&self) -> usize {
        self.hmac.size()
    }

    pub fn etm(&self) -> bool {
        self.hmac.etm()
    }

    pub fn decrypt<B: AsMut<[u8]>>(&mut self, mut buf: B) -> Result<()> {
        if self.cipher != Cipher::None {
            self.cipher.decrypt(
                &mut self.state,
                self.chain.key.expose_secret(),
                self.chain.iv.expose_secret(),
                buf.as_mut(),
            )?;
        }

        Ok(())
    }

    pub fn verify(&mut self, seq: u32, buf: &[u8], mac: &[u8]) -> Result<()> {
        if self.hmac.size() > 0 {
            self.hmac
                .verify(seq, buf, self.chain.hmac.expose_secret(), mac)?;
        }

        Ok(())
    }

    /// Release `zlib@openssh.com`'s `delayed` compression, enabled only
    /// once the session has authenticated (RFC draft `delayed-compression`).
    pub fn enable_delayed(&mut self) {
        self.delayed = true;
    }

    fn delayed_gate(&self) -> bool {
        self.compress != algorithm::Compress::ZlibOpenssh || self.delayed
    }

    pub fn decompress(&mut self, buf: Vec<u8>) -> Result<Vec<u8>> {
        if self.delayed_gate() {
            self.compress.decompress(buf)
        } else {
            Ok(buf)
        }
    }

    pub fn compress<B: AsRef<[u8]>>(&mut self, buf: B) -> Result<Vec<u8>> {
        if self.delayed_gate() {
            self.compress.compress(buf.as_ref())
        } else {
            Ok(buf.as_ref().to_vec())
        }
    }

    /// Compute the padding length so that `packet_length + 4` is a multiple
    /// of `max(8, block_size)`, with at least 4 bytes of padding (RFC 4253
    /// §6).
    fn padding(&self, payload: usize) -> u8 {
        const MIN_PAD_SIZE: usize = 4;
        const MIN_ALIGN: usize = 8;

        let align = self.block_size().max(MIN_ALIGN);

        // size of `padding_length || payload`, the part that's always encrypted.
        let size = std::mem::size_of::<u8>() + payload;
        let padding = align - size % align;

        let padding = if padding < MIN_PAD_SIZE {
            padding + align
        } else {
            padding
        };

        if 4 + size + padding < self.block_size().max(MIN_PACKET_SIZE) {
            (padding + align) as u8
        } else {
            padding as u8
        }
    }

    /// Prefix `buf` with a padding-length byte and append random padding,
    /// producing `padding_length || payload || random_padding`.
    pub fn pad(&mut self, mut buf: Vec<u8>) -> Result<Vec<u8>> {
        let mut rng = rand::thread_rng();

        let padding = self.padding(buf.len());

        let mut padded = vec![padding];
        padded.append(&mut buf);

        padded.resize_with(padded.len() + padding as usize, || rng.r#gen());

        Ok(padded)
    }

    pub fn encrypt<B: AsMut<[u8]>>(&mut self, mut buf: B) -> Result<()> {
        if self.cipher != Cipher::None {
            self.cipher.encrypt(
                &mut self.state,
                self.chain.key.expose_secret(),
                self.chain.iv.expose_secret(),
                buf.as_mut(),
            )?;
        }

        Ok(())
    }

    pub fn sign(&mut self, seq: u32, buf: &[u8]) -> Vec<u8> {
        self.hmac
            .sign(seq, buf, self.chain.hmac.expose_secret())
    }
}

pub fn negociate_hostkey(clientkex: &KexInit, serverkex: &KexInit) -> Result<algorithm::Key> {
    algorithm::key::negociate(clientkex, serverkex)
}
