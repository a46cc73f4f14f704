//! The raw byte pipe backing a [`crate::Session`], and its read/write
//! halves once version exchange is done and the reader task and the
//! write lock start operating on them independently (invariants I1/I3).

use futures::{AsyncBufRead, AsyncWrite};

use crate::codec::{Decoder, Encoder};

/// Anything usable as the underlying connection for a [`crate::Session`]:
/// buffered reads (needed for the byte-at-a-time version-banner scan) plus
/// async writes, held for the life of the session and then split in two.
pub trait Pipe: AsyncBufRead + AsyncWrite + Unpin + Send + Sync + 'static {}
impl<T: AsyncBufRead + AsyncWrite + Unpin + Send + Sync + 'static> Pipe for T {}

/// The write half of a split [`Pipe`], paired with the outbound encoder
/// state. Guarded together behind the session's write lock: the lock is
/// held across encode *and* the socket write, which is what makes it a
/// serialization point (I1).
pub(crate) struct TxHalf<IO> {
    pub(crate) io: futures::io::WriteHalf<IO>,
    pub(crate) encoder: Encoder,
}

/// The read half of a split [`Pipe`], paired with the inbound decoder
/// state. Owned exclusively by the session's reader task, so a pending
/// read never blocks a concurrent write.
pub(crate) struct RxHalf<IO> {
    pub(crate) io: futures::io::ReadHalf<IO>,
    pub(crate) decoder: Decoder,
}
