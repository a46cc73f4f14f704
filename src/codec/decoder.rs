use futures::{AsyncRead, AsyncReadExt};
use ssh_packet::Packet;

use crate::{transport::Transport, Error, Result};

/// Largest `packet_length` accepted on the wire, per the resolved
/// implementation-defined limit (see design notes): 256 KiB.
pub(crate) const MAX_PACKET_LENGTH: u32 = 262_144;

/// Mirror of [`Encoder`](super::Encoder) on the receive side: tracks the
/// inbound cipher/hmac/compression state and the sequence number, and
/// decrypts, verifies, decompresses and unframes inbound payloads.
///
/// See spec component **4.3 Decoder**.
#[derive(Debug, Default)]
pub struct Decoder {
    transport: Transport,
    seq: u32,
    authenticated: bool,
    bytes: u64,
}

impl Decoder {
    /// Read and decode one packet, returning its raw payload wrapped in a
    /// [`Packet`] ready for `.to::<T>()` downcasting.
    ///
    /// Implemented as two sequential await points on the same connection,
    /// matching the `AWAIT_LENGTH` / `AWAIT_REST` phases of the design: the
    /// first reads just enough to learn `packet_length` (one cipher block,
    /// or four plaintext bytes under encrypt-then-mac), the second reads
    /// the remainder plus the MAC.
    pub async fn decode(&mut self, reader: &mut (impl AsyncRead + Unpin)) -> Result<Packet> {
        let seq = self.seq;
        self.seq = self.seq.wrapping_add(1);

        // AWAIT_LENGTH: learn `packet_length`, decrypting the first block
        // eagerly for mac-then-encrypt ciphers since it's the only way to
        // recover the length under them.
        let header_len = if self.transport.etm() {
            4
        } else {
            self.transport.block_size().max(4)
        };

        let mut head = vec![0u8; header_len];
        reader.read_exact(&mut head).await?;

        if !self.transport.etm() {
            self.transport.decrypt(&mut head[..])?;
        }

        let packet_length = u32::from_be_bytes(head[..4].try_into().unwrap());

        if packet_length == 0 || packet_length > MAX_PACKET_LENGTH {
            return Err(Error::PacketLength(packet_length));
        }

        // AWAIT_REST: the rest of the padded payload, plus the MAC.
        let remaining = 4 + packet_length as usize - header_len;

        let mut rest = vec![0u8; remaining];
        reader.read_exact(&mut rest).await?;

        let mut mac = vec![0u8; self.transport.mac_size()];
        reader.read_exact(&mut mac).await?;

        let padded = if self.transport.etm() {
            let mut unencrypted = head[..4].to_vec();
            unencrypted.extend_from_slice(&rest);
            self.transport.verify(seq, &unencrypted, &mac)?;

            self.transport.decrypt(&mut rest)?;
            rest
        } else {
            // mac-then-encrypt: decrypt first, the mac covers the plaintext.
            self.transport.decrypt(&mut rest)?;

            let mut whole = head[..4].to_vec();
            whole.extend_from_slice(&head[4..header_len]);
            whole.extend_from_slice(&rest);
            self.transport.verify(seq, &whole, &mac)?;

            let mut padded = head[4..header_len].to_vec();
            padded.extend_from_slice(&rest);
            padded
        };

        let padding_length = *padded.first().ok_or(Error::PacketLength(packet_length))? as usize;
        let payload_end = padded
            .len()
            .checked_sub(padding_length)
            .ok_or(Error::PacketLength(packet_length))?;

        let payload = self
            .transport
            .decompress(padded[1..payload_end].to_vec())?;

        self.bytes += (4 + packet_length) as u64 + mac.len() as u64;

        Ok(Packet { payload })
    }

    pub fn sequence_number(&self) -> u32 {
        self.seq
    }

    /// Bytes received since the last `new_keys` (P3).
    pub fn bytes_received(&self) -> u64 {
        self.bytes
    }

    pub fn set_authenticated(&mut self) {
        self.authenticated = true;
        self.transport.enable_delayed();
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    /// Atomically replace the algorithm/key state. Called by the
    /// `KeyExchanger` immediately after *receiving* the peer's `NEWKEYS`
    /// (invariant I3) — independently from the encoder's swap.
    ///
    /// As with the encoder, the sequence number outlives the rekey (P3);
    /// only the byte counter resets.
    pub fn new_keys(&mut self, mut transport: Transport) {
        if self.authenticated {
            transport.enable_delayed();
        }

        self.transport = transport;
        self.bytes = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::Encoder;
    use futures::io::Cursor;

    #[tokio::test]
    async fn round_trips_a_plain_payload() {
        let mut encoder = Encoder::default();
        let mut decoder = Decoder::default();

        let payload = vec![5u8, 1, 2, 3, 4];
        let wire = encoder.frame(payload.clone()).unwrap();

        let mut cursor = Cursor::new(wire);
        let packet = decoder.decode(&mut cursor).await.unwrap();

        assert_eq!(packet.payload, payload);
    }

    #[tokio::test]
    async fn round_trips_an_etm_hmac_payload() {
        use crate::algorithm::Hmac;
        use secrecy::SecretBox;

        // Encryption itself stays `none` here — this test is only about the
        // encrypt-then-mac input matching on both sides (the bug this
        // guards against was an asymmetric MAC, not a cipher issue).
        let hmac_key = vec![0x42u8; 32];

        let mut encoder = Encoder::default();
        encoder.transport.hmac = Hmac::HmacSha256ETM;
        encoder.transport.chain.hmac = SecretBox::new(Box::new(hmac_key.clone()));

        let mut decoder = Decoder::default();
        decoder.transport.hmac = Hmac::HmacSha256ETM;
        decoder.transport.chain.hmac = SecretBox::new(Box::new(hmac_key));

        let payload = vec![9u8, 8, 7, 6, 5, 4, 3, 2, 1, 0];
        let wire = encoder.frame(payload.clone()).unwrap();

        let mut cursor = Cursor::new(wire);
        let packet = decoder
            .decode(&mut cursor)
            .await
            .expect("etm mac must verify against the matching encoder");

        assert_eq!(packet.payload, payload);
    }

    #[tokio::test]
    async fn rejects_oversized_packet_length() {
        let mut decoder = Decoder::default();
        let mut wire = (MAX_PACKET_LENGTH + 1).to_be_bytes().to_vec();
        wire.extend_from_slice(&[0u8; 8]);

        let mut cursor = Cursor::new(wire);
        let err = decoder.decode(&mut cursor).await.unwrap_err();

        assert!(matches!(err, Error::PacketLength(_)));
    }
}
