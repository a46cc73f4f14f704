use futures::{AsyncWrite, AsyncWriteExt};
use ssh_packet::{IntoPacket, Packet};

use crate::{transport::Transport, Result};

/// Maintains outbound cipher/hmac/compression state and the sequence number,
/// and frames, pads, compresses, signs and encrypts outbound payloads.
///
/// See spec component **4.2 Encoder**.
#[derive(Debug, Default)]
pub struct Encoder {
    pub(crate) transport: Transport,
    seq: u32,
    authenticated: bool,
    bytes: u64,
}

impl Encoder {
    /// Frame, pad, compress, sign and encrypt `message`, writing the wire
    /// bytes to `writer` and returning the sequence number the packet was
    /// sent under (the pre-increment value).
    pub async fn encode(
        &mut self,
        writer: &mut (impl AsyncWrite + Unpin),
        message: impl IntoPacket,
    ) -> Result<u32> {
        let Packet { payload } = message.into_packet();

        let wire = self.frame(payload)?;
        self.bytes += wire.len() as u64;

        writer.write_all(&wire).await?;
        writer.flush().await?;

        let seq = self.seq;
        self.seq = self.seq.wrapping_add(1);

        Ok(seq)
    }

    /// Bytes sent since the last `new_keys`, used alongside the sequence
    /// number to decide whether a rekey is due (P3).
    pub fn bytes_sent(&self) -> u64 {
        self.bytes
    }

    /// Produce the framed, encrypted wire bytes for `payload` without
    /// touching any I/O — split out so tests can exercise P2/P5 without a
    /// transport.
    pub(crate) fn frame(&mut self, payload: Vec<u8>) -> Result<Vec<u8>> {
        let compressed = self.transport.compress(&payload)?;
        let padded = self.transport.pad(compressed)?;

        let packet_length = padded.len() as u32;
        let mut unencrypted = Vec::with_capacity(4 + padded.len());
        unencrypted.extend_from_slice(&packet_length.to_be_bytes());
        unencrypted.extend_from_slice(&padded);

        let mut wire = unencrypted.clone();

        if self.transport.etm() {
            // encrypt-then-mac: mac covers seq || packet_length || ciphertext,
            // i.e. the whole clear-length-prefixed frame, computed once the
            // payload itself has been encrypted in place.
            self.transport.encrypt(&mut wire[4..])?;
            let mac = self.transport.sign(self.seq, &wire[..]);
            wire.extend_from_slice(&mac);
        } else {
            let mac = self.transport.sign(self.seq, &unencrypted);
            self.transport.encrypt(&mut wire[..])?;
            wire.extend_from_slice(&mac);
        }

        Ok(wire)
    }

    /// Number of bytes written since the last `new_keys`, used by the
    /// supervisor to decide the "fresh or wrapped" rekey trigger (P3).
    pub fn sequence_number(&self) -> u32 {
        self.seq
    }

    /// Enable the compression algorithm negotiated in `delayed` mode, if any.
    pub fn set_authenticated(&mut self) {
        self.authenticated = true;
        self.transport.enable_delayed();
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    /// Atomically replace the algorithm/key state. Called by the
    /// `KeyExchanger` immediately after *sending* `NEWKEYS` (invariant I3) —
    /// never before, never batched with the decoder's swap.
    ///
    /// The sequence number is a property of the direction, not of the
    /// algorithm suite: it is **not** reset by a rekey, only by its own
    /// wraparound past `u32::MAX` (P3). Only the byte counter driving the
    /// rekey-by-volume policy resets here.
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

    #[test]
    fn frame_is_block_aligned_with_min_padding() {
        let mut encoder = Encoder::default();
        let wire = encoder.frame(vec![42u8]).unwrap();

        // packet_length(4) + padding_length(1) + payload(1) + padding(>=4)
        assert!(wire.len() >= 4 + 1 + 1 + 4);
        assert_eq!((wire.len() - 4) % 8, 0);

        let padding_length = wire[4] as usize;
        assert!(padding_length >= 4);
    }

    #[test]
    fn sequence_number_wraps_but_survives_new_keys() {
        let mut encoder = Encoder::default();
        encoder.seq = u32::MAX;
        encoder.frame(vec![0]).unwrap();
        assert_eq!(encoder.seq, u32::MAX);

        encoder.seq = encoder.seq.wrapping_add(1);
        assert_eq!(encoder.seq, 0);

        encoder.seq = 7;
        encoder.bytes = 123;
        encoder.new_keys(Transport::none());
        assert_eq!(encoder.seq, 7);
        assert_eq!(encoder.bytes, 0);
    }
}
