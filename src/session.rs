//! The transport supervisor: the public [`Session`] handle driving version
//! exchange, rekey triggers, write serialization, transport-message
//! dispatch, the heartbeater, and the disconnect/die teardown paths.
//!
//! See spec component **4.6 Transport supervisor**. The reader task is the
//! sole owner of the decoder and the only thing that ever calls
//! [`crate::codec::Decoder::decode`]; everything else goes through the
//! write lock (`Shared::tx`), which is what realizes invariant I1.

use std::sync::{
    atomic::{AtomicBool, AtomicU32, AtomicU8, Ordering},
    Arc,
};

use async_trait::async_trait;
use futures::{AsyncReadExt, AsyncWriteExt};
use ssh_packet::{
    trans::{
        Debug, Disconnect, DisconnectReason, Ignore, KexInit, ServiceAccept, ServiceRequest,
        Unimplemented,
    },
    IntoPacket, Packet,
};
use tokio::sync::{mpsc, oneshot, Mutex, Notify};

use crate::{
    codec::{self, Decoder, Encoder},
    config::ClientConfig,
    error::{DisconnectedBy, DisconnectedError},
    heartbeat::Heartbeater,
    kex::{KexIo, KeyExchanger},
    service::{NullService, Service},
    stream::{Pipe, RxHalf, TxHalf},
    transport::Transport,
    Error, Result,
};

const DISCONNECT_ID: u8 = 1;
const IGNORE_ID: u8 = 2;
const UNIMPLEMENTED_ID: u8 = 3;
const DEBUG_ID: u8 = 4;
const SERVICE_REQUEST_ID: u8 = 5;
const SERVICE_ACCEPT_ID: u8 = 6;
const KEXINIT_ID: u8 = 20;
const NEWKEYS_ID: u8 = 21;
const KEX_RANGE_START: u8 = 30;
const TRANSPORT_RANGE_END: u8 = 49;

fn is_kex_message(msg: u8) -> bool {
    msg == KEXINIT_ID || msg == NEWKEYS_ID || (KEX_RANGE_START..=TRANSPORT_RANGE_END).contains(&msg)
}

/// A one-shot event, optionally carrying the error that fired it. Models
/// `close`/`serviceAccept` (spec component **4.6**, "Events").
///
/// Reusable across rounds via [`Self::reset`]: `serviceAccept` is armed and
/// consumed once per `reqService` call, not just once per session.
struct Latch {
    result: std::sync::Mutex<Option<std::result::Result<(), DisconnectedError>>>,
    notify: Notify,
}

impl Latch {
    fn new() -> Self {
        Self {
            result: std::sync::Mutex::new(None),
            notify: Notify::new(),
        }
    }

    fn reset(&self) {
        *self.result.lock().expect("poisoned") = None;
    }

    fn set(&self, result: std::result::Result<(), DisconnectedError>) {
        let mut guard = self.result.lock().expect("poisoned");
        if guard.is_none() {
            *guard = Some(result);
            drop(guard);
            self.notify.notify_waiters();
        }
    }

    fn is_set(&self) -> bool {
        self.result.lock().expect("poisoned").is_some()
    }

    async fn wait(&self) -> std::result::Result<(), DisconnectedError> {
        loop {
            let notified = self.notify.notified();

            if let Some(result) = self.result.lock().expect("poisoned").clone() {
                return result;
            }

            notified.await;
        }
    }
}

/// Tracks whether a kex is currently in flight, so [`Session::write`] can
/// gate outbound messages against it (spec component **4.6**, `write`).
#[derive(Default)]
struct KexGate {
    ongoing: AtomicBool,
    notify: Notify,
}

impl KexGate {
    /// Atomically claim the gate for a new round: `true` if this caller is
    /// the one that gets to run it, `false` if a round is already ongoing
    /// (the caller should wait on it instead of starting its own).
    fn try_begin(&self) -> bool {
        self.ongoing
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    fn finish(&self) {
        self.ongoing.store(false, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    fn is_ongoing(&self) -> bool {
        self.ongoing.load(Ordering::SeqCst)
    }

    async fn wait_for_done(&self) {
        while self.is_ongoing() {
            let notified = self.notify.notified();
            if !self.is_ongoing() {
                break;
            }
            notified.await;
        }
    }
}

/// The reader's half of a running kex round: where to forward decoded
/// kex-range packets, and the (one-shot, taken on `NEWKEYS`) receiver for
/// the inbound transport the kex task stages ahead of time.
struct KexActive {
    to_kex: mpsc::UnboundedSender<Packet>,
    rx_ready: Option<oneshot::Receiver<Transport>>,
}

/// State shared between the [`Session`] handle, the reader task and the
/// heartbeater. Everything reachable from more than one of those lives
/// here, behind whichever lock fits its access pattern.
struct Shared<IO: Pipe> {
    tx: Mutex<TxHalf<IO>>,

    kex: KeyExchanger,
    kex_gate: KexGate,
    kex_active: std::sync::Mutex<Option<KexActive>>,
    session_id: std::sync::OnceLock<Vec<u8>>,

    config: ClientConfig,
    peer_id: String,

    service: Mutex<Box<dyn Service>>,
    authenticated: AtomicBool,

    last_recv_msg: AtomicU8,
    last_recv_seq: AtomicU32,
    expecting_service_accept: AtomicBool,

    service_accept: Latch,
    close: Latch,
    shutting_down: AtomicBool,

    reader_abort: std::sync::Mutex<Option<tokio::task::AbortHandle>>,
    heartbeat: std::sync::Mutex<Option<Heartbeater>>,
}

impl<IO: Pipe> Shared<IO> {
    fn is_authenticated(&self) -> bool {
        self.authenticated.load(Ordering::SeqCst)
    }
}

#[async_trait]
trait WriteSink: Send + Sync {
    async fn write(&self, packet: Packet) -> Result<u32>;
}

struct SharedWriter<IO: Pipe>(Arc<Shared<IO>>);

#[async_trait]
impl<IO: Pipe> WriteSink for SharedWriter<IO> {
    async fn write(&self, packet: Packet) -> Result<u32> {
        Session::write_inner(&self.0, packet).await
    }
}

/// A write handle gated the same way as [`Session::write`], held by the
/// [`Heartbeater`] so it doesn't need a full, `IO`-typed [`Session`].
pub(crate) struct Writer(Arc<dyn WriteSink>);

impl Writer {
    pub(crate) async fn write(&self, message: impl IntoPacket + Send) -> Result<u32> {
        self.0.write(message.into_packet()).await
    }
}

/// A live SSH transport connection to a single peer.
///
/// Handles version exchange, key-exchange (initial and rekeys), binary
/// packet framing, and the small set of `SSH-TRANS` messages that belong to
/// this layer (`DISCONNECT`, `IGNORE`, `DEBUG`, `UNIMPLEMENTED`,
/// `SERVICE_REQUEST`/`ACCEPT`). Everything else is handed to whatever
/// [`Service`] is installed via [`Session::set_service`].
///
/// Cheaply cloneable: clones share the same connection and reader task.
pub struct Session<IO: Pipe> {
    shared: Arc<Shared<IO>>,
}

impl<IO: Pipe> Clone for Session<IO> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<IO: Pipe> Session<IO> {
    /// Send our identification string, parse the peer's, split the pipe and
    /// spawn the reader task.
    ///
    /// The initial key-exchange is *not* run here: register any host-key
    /// verifier first (`add_host_key_verifier`), then either call
    /// [`Session::do_kex`] explicitly or just start writing — the first
    /// write through a fresh encoder triggers it per the usual rekey rule.
    pub async fn init(mut io: IO, config: ClientConfig) -> Result<Self> {
        config.id.to_async_writer(&mut io).await?;
        io.flush().await?;

        let peer_id = tokio::time::timeout(config.timeout, codec::read_banner(&mut io))
            .await
            .map_err(|_| Error::Timeout)??;

        tracing::debug!(peer = %peer_id, "identification exchange complete");

        let (rx_io, tx_io) = io.split();

        let shared = Arc::new(Shared {
            tx: Mutex::new(TxHalf {
                io: tx_io,
                encoder: Encoder::default(),
            }),
            kex: KeyExchanger::new(),
            kex_gate: KexGate::default(),
            kex_active: std::sync::Mutex::new(None),
            session_id: std::sync::OnceLock::new(),
            config,
            peer_id,
            service: Mutex::new(Box::new(NullService)),
            authenticated: AtomicBool::new(false),
            last_recv_msg: AtomicU8::new(0),
            last_recv_seq: AtomicU32::new(0),
            expecting_service_accept: AtomicBool::new(false),
            service_accept: Latch::new(),
            close: Latch::new(),
            shutting_down: AtomicBool::new(false),
            reader_abort: std::sync::Mutex::new(None),
            heartbeat: std::sync::Mutex::new(None),
        });

        let rx = RxHalf {
            io: rx_io,
            decoder: Decoder::default(),
        };

        let reader_shared = shared.clone();
        let reader_task = tokio::spawn(Self::reader_loop(reader_shared, rx));
        *shared.reader_abort.lock().expect("poisoned") = Some(reader_task.abort_handle());

        let writer = Arc::new(Writer(Arc::new(SharedWriter(shared.clone()))));
        if let Some(heartbeat) = Heartbeater::spawn(writer, shared.config.heartbeat) {
            *shared.heartbeat.lock().expect("poisoned") = Some(heartbeat);
        }

        Ok(Self { shared })
    }

    /// The peer's raw identification line, as received during version
    /// exchange (without the trailing CRLF).
    pub fn peer_id(&self) -> &str {
        &self.shared.peer_id
    }

    /// The session identifier: the exchange hash of the *first* kex,
    /// unaffected by any later rekey (I5). `None` only before `init`
    /// finishes, which never happens from outside this module.
    pub fn session_id(&self) -> Option<&[u8]> {
        self.shared.session_id.get().map(Vec::as_slice)
    }

    pub fn is_authenticated(&self) -> bool {
        self.shared.is_authenticated()
    }

    /// `true` until the session has disconnected or died.
    pub fn is_running(&self) -> bool {
        !self.shared.close.is_set()
    }

    /// Register a host-key verifier. A key is accepted once at least one
    /// registered verifier accepts it; a session without any registered
    /// verifier fails every kex closed (no host key is ever trusted by
    /// default).
    pub fn add_host_key_verifier(
        &self,
        verifier: impl Fn(&ssh_key::PublicKey) -> bool + Send + Sync + 'static,
    ) {
        self.shared.kex.add_host_key_verifier(verifier);
    }

    /// Explicitly trigger a kex, blocking until it completes. Also how the
    /// initial kex is normally run, right after registering host-key
    /// verifiers and before any other traffic.
    pub async fn do_kex(&self) -> Result<()> {
        Self::run_kex(&self.shared, None).await
    }

    /// Install the service that receives every packet this layer doesn't
    /// itself consume.
    pub async fn set_service(&self, service: impl Service + 'static) {
        *self.shared.service.lock().await = Box::new(service);
    }

    /// Mark the session authenticated: releases any `delayed`-mode
    /// compression algorithm negotiated during kex (RFC draft
    /// `delayed-compression`).
    pub async fn set_authenticated(&self) {
        self.shared.authenticated.store(true, Ordering::SeqCst);
        self.shared.tx.lock().await.encoder.set_authenticated();
        // the decoder lives on the reader task; it picks the flag up
        // itself at the top of its next iteration.
    }

    /// Request a service by name, blocking until `SERVICE_ACCEPT` arrives or
    /// the configured timeout elapses, then install `service` as the active
    /// one.
    pub async fn req_service(&self, name: &'static str, service: impl Service + 'static) -> Result<()> {
        let shared = &self.shared;

        if let Some(err) = Self::closed_error(shared) {
            return Err(err.into());
        }

        shared.service_accept.reset();
        shared.expecting_service_accept.store(true, Ordering::SeqCst);

        Self::write_inner(
            shared,
            ServiceRequest {
                service_name: name.into(),
            },
        )
        .await?;

        let result = tokio::time::timeout(shared.config.timeout, shared.service_accept.wait()).await;
        shared.expecting_service_accept.store(false, Ordering::SeqCst);

        match result {
            Ok(Ok(())) => {
                self.set_service(service).await;
                Ok(())
            }
            Ok(Err(disconnected)) => Err(disconnected.into()),
            Err(_) => Err(Error::Timeout),
        }
    }

    /// Write `message` through the kex-gated, serialized write path.
    pub async fn write(&self, message: impl IntoPacket) -> Result<u32> {
        Self::write_inner(&self.shared, message).await
    }

    /// Emit `SSH_MSG_UNIMPLEMENTED` referencing the last inbound sequence
    /// number.
    pub async fn send_unimplemented(&self) -> Result<u32> {
        let seq = self.shared.last_recv_seq.load(Ordering::SeqCst);
        Self::write_inner(&self.shared, Unimplemented { seq }).await
    }

    /// Block until the session has been disconnected or has died.
    pub async fn join(&self) -> std::result::Result<(), DisconnectedError> {
        self.shared.close.wait().await
    }

    /// Send a `DISCONNECT` and tear the session down from our side.
    /// Concurrent calls, and a subsequent call after the session already
    /// died, are no-ops beyond waiting for the teardown already in flight.
    pub async fn disconnect(&self, reason: DisconnectReason, description: impl Into<String>) {
        Self::disconnect_inner(&self.shared, reason, description.into()).await
    }

    fn closed_error(shared: &Arc<Shared<IO>>) -> Option<DisconnectedError> {
        shared
            .close
            .result
            .lock()
            .expect("poisoned")
            .clone()
            .and_then(|result| result.err())
    }

    async fn disconnect_inner(shared: &Arc<Shared<IO>>, reason: DisconnectReason, description: String) {
        if shared.shutting_down.swap(true, Ordering::SeqCst) {
            let _ = shared.close.wait().await;
            return;
        }

        let disconnected = DisconnectedError {
            by: DisconnectedBy::Us,
            reason,
            description: description.clone(),
        };

        {
            let service = shared.service.lock().await;
            service.notify_disconnect(&disconnected).await;
        }
        *shared.service.lock().await = Box::new(NullService);

        let packet = Disconnect {
            reason,
            description: description.as_str().into(),
            language: Default::default(),
        };
        let _ = {
            let mut tx = shared.tx.lock().await;
            tx.encoder.encode(&mut tx.io, packet).await
        };

        if let Some(abort) = shared.reader_abort.lock().expect("poisoned").take() {
            abort.abort();
        }
        drop(shared.heartbeat.lock().expect("poisoned").take());

        shared.service_accept.set(Err(disconnected.clone()));
        shared.close.set(Ok(()));

        let _ = {
            let mut tx = shared.tx.lock().await;
            tx.io.close().await
        };
    }

    /// Tear the session down after an unrecoverable error: notify the
    /// service, abort the reader and heartbeater, best-effort emit a
    /// closing `DISCONNECT` (unless the peer already sent one, or this
    /// error *is* one), and close the underlying pipe.
    async fn die(shared: &Arc<Shared<IO>>, error: &Error) {
        if shared.shutting_down.swap(true, Ordering::SeqCst) {
            return;
        }

        tracing::warn!(%error, "transport died");

        let disconnected = match error {
            Error::Disconnected(err) => err.clone(),
            other => DisconnectedError {
                by: DisconnectedBy::Us,
                reason: other.disconnect_reason().unwrap_or(DisconnectReason::ProtocolError),
                description: other.to_string(),
            },
        };

        {
            let service = shared.service.lock().await;
            service.notify_error(error).await;
        }
        *shared.service.lock().await = Box::new(NullService);

        if let Some(abort) = shared.reader_abort.lock().expect("poisoned").take() {
            abort.abort();
        }
        drop(shared.heartbeat.lock().expect("poisoned").take());

        let last = shared.last_recv_msg.load(Ordering::SeqCst);
        if last != DISCONNECT_ID {
            if let Some(reason) = error.disconnect_reason() {
                let packet = Disconnect {
                    reason,
                    description: error.to_string().as_str().into(),
                    language: Default::default(),
                };

                if let Ok(mut tx) = shared.tx.try_lock() {
                    let _ = tx.encoder.encode(&mut tx.io, packet).await;
                }
            }
        }

        shared.service_accept.set(Err(disconnected.clone()));
        shared.close.set(Err(disconnected));

        if let Ok(mut tx) = shared.tx.try_lock() {
            let _ = tx.io.close().await;
        }
    }

    async fn write_inner(shared: &Arc<Shared<IO>>, message: impl IntoPacket) -> Result<u32> {
        let packet = message.into_packet();
        let msg = packet.payload.first().copied().unwrap_or(0);

        if shared.kex_gate.is_ongoing() {
            let bypass = (1..=TRANSPORT_RANGE_END).contains(&msg) && msg != SERVICE_REQUEST_ID;
            if !bypass {
                shared.kex_gate.wait_for_done().await;
            }
        }

        if !shared.kex_gate.is_ongoing() {
            let fresh = {
                let tx = shared.tx.lock().await;
                tx.encoder.sequence_number() == 0
            };

            if fresh {
                Self::run_kex(shared, None).await?;
            }
        }

        let mut tx = shared.tx.lock().await;
        let result = tx.encoder.encode(&mut tx.io, packet).await;
        drop(tx);

        if let Err(err) = &result {
            Self::die(shared, err).await;
        }

        result
    }

    /// Run one kex round (initial or rekey) end to end: registers the
    /// reader hand-off, drives [`KeyExchanger::run`], then tears the
    /// hand-off down again. Failure escalates to [`Self::die`].
    ///
    /// Claims `kex_gate` with a single compare-and-swap before touching
    /// `kex_active`: if a round is already in flight (a concurrent
    /// `do_kex`/write-triggered rekey, or an unsolicited peer `KEXINIT`
    /// racing this one), this call waits for that round instead of
    /// overwriting its hand-off channels out from under it.
    async fn run_kex(shared: &Arc<Shared<IO>>, peer_kexinit: Option<KexInit<'static>>) -> Result<()> {
        if !shared.kex_gate.try_begin() {
            shared.kex_gate.wait_for_done().await;

            return match Self::closed_error(shared) {
                Some(err) => Err(err.into()),
                None => Ok(()),
            };
        }

        let (to_kex, rx) = mpsc::unbounded_channel();
        let (ready_tx, ready_rx) = oneshot::channel();

        *shared.kex_active.lock().expect("poisoned") = Some(KexActive {
            to_kex,
            rx_ready: Some(ready_rx),
        });

        let mut io = KexIo::new(&shared.tx, rx, ready_tx, &shared.session_id);
        let result = shared
            .kex
            .run(&mut io, &shared.config, &shared.peer_id, peer_kexinit)
            .await;

        *shared.kex_active.lock().expect("poisoned") = None;
        shared.kex_gate.finish();

        if let Err(err) = &result {
            Self::die(shared, err).await;
        }

        result.map(|_| ())
    }

    /// Dispatch one decoded transport/service-range packet. Kex-range
    /// packets never reach here — the reader routes those to the active
    /// kex round (or an unsolicited-rekey spawn) before calling this.
    async fn handle(shared: &Arc<Shared<IO>>, msg: u8, seq: u32, packet: Packet) -> Result<()> {
        shared.last_recv_msg.store(msg, Ordering::SeqCst);

        if msg >= 50 {
            shared.service.lock().await.handle(packet.payload).await;
            return Ok(());
        }

        match msg {
            DISCONNECT_ID => {
                let Disconnect {
                    reason, description, ..
                } = packet.to()?;

                tracing::info!(?reason, "peer disconnected: {}", &*description);

                return Err(DisconnectedError {
                    by: DisconnectedBy::Them,
                    reason,
                    description: description.into_string(),
                }
                .into());
            }
            IGNORE_ID => {
                let Ignore { data } = packet.to()?;
                tracing::trace!(len = data.len(), "received SSH_MSG_IGNORE");
            }
            UNIMPLEMENTED_ID => {
                let Unimplemented { seq: offending } = packet.to()?;

                if shared.kex_gate.is_ongoing() {
                    return Err(Error::UnexpectedMessage);
                }

                shared.service.lock().await.notify_unimplemented(offending).await;
            }
            DEBUG_ID => {
                let Debug { message, .. } = packet.to()?;
                tracing::debug!("peer debug: {}", &*message);
            }
            SERVICE_ACCEPT_ID => {
                if !shared.expecting_service_accept.swap(false, Ordering::SeqCst) {
                    return Err(Error::UnexpectedMessage);
                }

                let ServiceAccept { .. } = packet.to()?;
                shared.service_accept.set(Ok(()));
            }
            _ => {
                tracing::debug!(msg, "unrecognised transport message, replying UNIMPLEMENTED");
                let _ = Self::write_inner(shared, Unimplemented { seq }).await;
            }
        }

        Ok(())
    }

    /// Owns the read half and the decoder for the lifetime of the session.
    /// Decodes one packet at a time, routes kex-range packets to whatever
    /// kex round is active (spawning an unsolicited one if the peer started
    /// it), and hands everything else to [`Self::handle`].
    async fn reader_loop(shared: Arc<Shared<IO>>, mut rx: RxHalf<IO>) {
        loop {
            if shared.is_authenticated() && !rx.decoder.is_authenticated() {
                rx.decoder.set_authenticated();
            }

            let packet = match rx.decoder.decode(&mut rx.io).await {
                Ok(packet) => packet,
                Err(err) => {
                    Self::die(&shared, &err).await;
                    return;
                }
            };

            let seq = rx.decoder.sequence_number().wrapping_sub(1);
            shared.last_recv_seq.store(seq, Ordering::SeqCst);

            let msg = match packet.payload.first() {
                Some(&id) => id,
                None => continue,
            };

            if is_kex_message(msg) {
                let mut guard = shared.kex_active.lock().expect("poisoned");
                match guard.as_mut() {
                    Some(active) => {
                        let _ = active.to_kex.send(packet);
                        let ready = if msg == NEWKEYS_ID {
                            active.rx_ready.take()
                        } else {
                            None
                        };
                        drop(guard);

                        if let Some(ready) = ready {
                            if let Ok(transport) = ready.await {
                                rx.decoder.new_keys(transport);
                            }
                        }
                    }
                    None => {
                        drop(guard);

                        if msg == KEXINIT_ID {
                            if let Ok(kexinit) = packet.to::<KexInit<'static>>() {
                                let shared = shared.clone();
                                tokio::spawn(async move {
                                    let _ = Session::run_kex(&shared, Some(kexinit)).await;
                                });
                            }
                        }
                    }
                }

                continue;
            }

            if let Err(err) = Self::handle(&shared, msg, seq, packet).await {
                Self::die(&shared, &err).await;
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn latch_wakes_all_waiters_with_the_first_result_only() {
        let latch = Arc::new(Latch::new());

        let waiters: Vec<_> = (0..4)
            .map(|_| {
                let latch = latch.clone();
                tokio::spawn(async move { latch.wait().await })
            })
            .collect();

        // give the waiters a chance to register before the set (P6: races
        // against `set` must still observe exactly one outcome).
        tokio::task::yield_now().await;

        latch.set(Err(DisconnectedError {
            by: DisconnectedBy::Us,
            reason: DisconnectReason::ByApplication,
            description: "bye".into(),
        }));

        // a second `set` (as from a concurrent `disconnect`/`die` race) must
        // not override the first result.
        latch.set(Ok(()));

        for waiter in waiters {
            let result = waiter.await.expect("task panicked");
            let err = result.expect_err("first set was an error");
            assert!(matches!(err.reason, DisconnectReason::ByApplication));
        }
    }

    #[tokio::test]
    async fn latch_wait_returns_immediately_once_already_set() {
        let latch = Latch::new();
        latch.set(Ok(()));

        assert!(latch.is_set());
        assert!(latch.wait().await.is_ok());
    }

    #[tokio::test]
    async fn latch_reset_allows_a_second_round() {
        let latch = Latch::new();
        latch.set(Ok(()));
        assert!(latch.is_set());

        latch.reset();
        assert!(!latch.is_set());

        latch.set(Err(DisconnectedError {
            by: DisconnectedBy::Them,
            reason: DisconnectReason::ProtocolError,
            description: "nope".into(),
        }));
        assert!(latch.wait().await.is_err());
    }

    #[tokio::test]
    async fn kex_gate_blocks_writers_until_finish() {
        let gate = Arc::new(KexGate::default());
        assert!(gate.try_begin());
        assert!(gate.is_ongoing());

        let waiting = {
            let gate = gate.clone();
            tokio::spawn(async move {
                gate.wait_for_done().await;
            })
        };

        tokio::task::yield_now().await;
        assert!(!waiting.is_finished());

        gate.finish();
        waiting.await.expect("task panicked");
        assert!(!gate.is_ongoing());
    }

    #[tokio::test]
    async fn kex_gate_wait_is_a_no_op_when_not_ongoing() {
        let gate = KexGate::default();
        assert!(!gate.is_ongoing());

        // must resolve without anyone ever calling `finish`.
        tokio::time::timeout(std::time::Duration::from_millis(200), gate.wait_for_done())
            .await
            .expect("wait_for_done hung on an idle gate");
    }

    #[test]
    fn kex_gate_try_begin_admits_only_one_claimant() {
        let gate = KexGate::default();

        assert!(gate.try_begin(), "first claimant must win the race");
        assert!(
            !gate.try_begin(),
            "a second concurrent claimant must not also start a round"
        );

        gate.finish();
        assert!(
            gate.try_begin(),
            "a finished gate must be claimable again for the next round"
        );
    }

    #[test]
    fn is_kex_message_matches_only_the_spec_ranges() {
        assert!(is_kex_message(KEXINIT_ID));
        assert!(is_kex_message(NEWKEYS_ID));
        assert!(is_kex_message(30));
        assert!(is_kex_message(49));
        assert!(!is_kex_message(DISCONNECT_ID));
        assert!(!is_kex_message(SERVICE_REQUEST_ID));
        assert!(!is_kex_message(50));
    }
}
