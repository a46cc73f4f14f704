//! Binary packet framing: encryption, integrity and compression applied to
//! (or stripped from) the raw message payloads handled by the rest of the
//! crate.
//!
//! Encoding and decoding are split into independent [`Encoder`] and
//! [`Decoder`] halves (see component **4.2**/**4.3**) so that the outbound
//! and inbound transport state can each swap to the keys of a completed
//! key-exchange at their own `NEWKEYS` boundary, per invariant I3.

mod encoder;
pub use encoder::Encoder;

mod decoder;
pub use decoder::Decoder;

mod banner;
pub(crate) use banner::read as read_banner;

#[doc(no_inline)]
pub use ssh_packet::Packet;
