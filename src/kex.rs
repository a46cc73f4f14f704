//! Drives a single key-exchange cycle: proposing algorithms, delegating the
//! cryptographic handshake to [`crate::algorithm::kex`], verifying the
//! peer's host key, and installing the resulting transport state at the
//! correct, independent `NEWKEYS` boundaries (invariant I3).
//!
//! [`KexIo`] is the narrow interface the supervisor (`crate::session`) hands
//! down into this module and [`crate::algorithm::kex`]: sending goes
//! straight through the write lock, while receiving is fed by the reader
//! task through a per-round channel rather than reading the wire directly —
//! the reader is the only thing that ever decodes a packet.

use ssh_packet::{
    trans::{KexInit, NewKeys},
    Packet,
};
use tokio::sync::{mpsc, oneshot, Mutex};

use crate::{
    algorithm::{self, kex::Kex},
    config::ClientConfig,
    stream::{Pipe, TxHalf},
    transport::{self, Transport},
    Error, Result,
};

type HostKeyVerifier = Box<dyn Fn(&ssh_key::PublicKey) -> bool + Send + Sync>;

/// The receive/send handle a kex round is driven through.
///
/// Sending locks the shared write half for the duration of one encode, same
/// as any other outbound message. Receiving pulls from an inbox the reader
/// task forwards kex-range packets into — never from the wire directly, so
/// the reader stays the single owner of the decoder.
pub(crate) struct KexIo<'a, IO: Pipe> {
    tx: &'a Mutex<TxHalf<IO>>,
    rx: mpsc::UnboundedReceiver<Packet>,
    rx_ready: Option<oneshot::Sender<Transport>>,
    session_id: &'a std::sync::OnceLock<Vec<u8>>,
}

impl<'a, IO: Pipe> KexIo<'a, IO> {
    pub(crate) fn new(
        tx: &'a Mutex<TxHalf<IO>>,
        rx: mpsc::UnboundedReceiver<Packet>,
        rx_ready: oneshot::Sender<Transport>,
        session_id: &'a std::sync::OnceLock<Vec<u8>>,
    ) -> Self {
        Self {
            tx,
            rx,
            rx_ready: Some(rx_ready),
            session_id,
        }
    }

    pub(crate) async fn send(&self, message: impl ssh_packet::IntoPacket) -> Result<u32> {
        let mut tx = self.tx.lock().await;
        tx.encoder.encode(&mut tx.io, message).await
    }

    pub(crate) async fn recv(&mut self) -> Result<Packet> {
        self.rx.recv().await.ok_or(Error::UnexpectedMessage)
    }

    pub(crate) async fn install_tx(&self, transport: Transport) {
        self.tx.lock().await.encoder.new_keys(transport);
    }

    /// Hand the inbound transport to the reader task, to be installed the
    /// moment it forwards the peer's `NEWKEYS` packet — staged here, well
    /// before that packet can physically have arrived: the peer can only
    /// send `NEWKEYS` after its own ecdh reply went out, and we don't reach
    /// this call until *we've* already received that reply.
    pub(crate) fn stage_rx(&mut self, transport: Transport) {
        if let Some(sender) = self.rx_ready.take() {
            let _ = sender.send(transport);
        }
    }

    /// Freeze `hash` as the session identifier, if this is the first kex to
    /// complete (I5) — a rekey's hash is discarded here.
    pub(crate) fn freeze_session_id(&self, hash: &[u8]) -> Vec<u8> {
        self.session_id.get_or_init(|| hash.to_vec()).clone()
    }
}

/// Orchestrates kex cycles against one connection: the initial handshake
/// and any later rekey.
///
/// Held behind the supervisor's `Arc`, so registration uses a `Mutex`
/// rather than `&mut self` — a verifier may be added at any point in the
/// session's life, not only before the first kex.
pub(crate) struct KeyExchanger {
    verifiers: std::sync::Mutex<Vec<HostKeyVerifier>>,
}

impl KeyExchanger {
    pub(crate) fn new() -> Self {
        Self {
            verifiers: std::sync::Mutex::new(Vec::new()),
        }
    }

    /// Register a host-key verifier. A key is accepted if at least one
    /// registered verifier accepts it; with none registered, every key is
    /// rejected (fail closed).
    pub(crate) fn add_host_key_verifier(
        &self,
        verifier: impl Fn(&ssh_key::PublicKey) -> bool + Send + Sync + 'static,
    ) {
        self.verifiers
            .lock()
            .expect("poisoned")
            .push(Box::new(verifier));
    }

    fn verify(&self, key: &ssh_key::PublicKey) -> bool {
        let verifiers = self.verifiers.lock().expect("poisoned");

        !verifiers.is_empty() && verifiers.iter().any(|verifier| verifier(key))
    }

    /// Run one full kex cycle: send our `KEXINIT`, receive (or consume an
    /// already-peeked) the peer's, negotiate, exchange key material,
    /// exchange `NEWKEYS`, and install `tx`/`rx` independently.
    ///
    /// Returns the exchange hash frozen as the session identifier on the
    /// first call; later rekeys return the same value (I5).
    pub(crate) async fn run(
        &self,
        io: &mut KexIo<'_, impl Pipe>,
        config: &ClientConfig,
        peer_id: &str,
        peer_kexinit: Option<KexInit<'static>>,
    ) -> Result<Vec<u8>> {
        let our_kexinit = config.kexinit();
        io.send(our_kexinit.clone()).await?;

        let peer_kexinit = match peer_kexinit {
            Some(kexinit) => kexinit,
            None => io.recv().await?.to::<KexInit<'static>>()?,
        };

        // Validate a common host-key algorithm exists even though the ecdh
        // exchange itself accepts whatever signature type the peer sends;
        // this surfaces a clean `NoCommonKey` instead of a confusing
        // signature-parse failure down the line.
        transport::negociate_hostkey(&our_kexinit, &peer_kexinit)?;

        let kex = algorithm::kex::negociate(&our_kexinit, &peer_kexinit)?;

        let mut host_key_check = |key: &ssh_key::PublicKey| self.verify(key);

        let pair = Kex::as_client(
            &kex,
            io,
            &config.id,
            peer_id,
            &our_kexinit,
            &peer_kexinit,
            &mut host_key_check,
        )
        .await?;

        // stage the inbound transport before anyone sends NEWKEYS at all.
        io.stage_rx(pair.rx);

        // send our NEWKEYS and swap the outbound transport immediately —
        // never batched with the inbound swap, which the reader applies on
        // its own timeline the moment it forwards the peer's NEWKEYS.
        io.send(NewKeys).await?;
        io.install_tx(pair.tx).await;

        io.recv()
            .await?
            .to::<NewKeys>()
            .map_err(|_| Error::UnexpectedMessage)?;

        Ok(pair.session_id)
    }
}
