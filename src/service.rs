//! The handoff interface to whatever sits above the transport layer
//! (authentication, connection multiplexing, ...).
//!
//! This crate only drives the handoff itself — `SSH_MSG_SERVICE_REQUEST` /
//! `SSH_MSG_SERVICE_ACCEPT` — and forwards transport-level notifications to
//! the active [`Service`]. Everything past that point is out of scope.

use async_trait::async_trait;

use crate::{error::DisconnectedError, Error};

/// Receives the packets and notifications a [`crate::Session`] can't make
/// sense of on its own once a service has taken over the connection.
#[async_trait]
pub trait Service: Send + Sync {
    /// The service name sent in `SSH_MSG_SERVICE_REQUEST`/`SSH_MSG_SERVICE_ACCEPT`
    /// (e.g. `ssh-userauth`, `ssh-connection`).
    fn name(&self) -> &str;

    /// Called with every packet the transport layer doesn't itself consume
    /// (i.e. isn't `SSH_MSG_DISCONNECT`/`IGNORE`/`DEBUG`/`UNIMPLEMENTED`/
    /// `KEXINIT` or a transport-level reply).
    async fn handle(&self, payload: Vec<u8>);

    /// Called once the peer (or we) closed the session, with the reason.
    async fn notify_disconnect(&self, err: &DisconnectedError);

    /// Called when the transport layer hits an unrecoverable error before a
    /// disconnect could be negotiated.
    async fn notify_error(&self, err: &Error);

    /// Called when the peer rejected one of our messages with
    /// `SSH_MSG_UNIMPLEMENTED`.
    async fn notify_unimplemented(&self, seq: u32);
}

/// The sentinel [`Service`] installed before `set_service` is called: it
/// acknowledges nothing and silently drops everything handed to it.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullService;

#[async_trait]
impl Service for NullService {
    fn name(&self) -> &str {
        ""
    }

    async fn handle(&self, _payload: Vec<u8>) {}

    async fn notify_disconnect(&self, _err: &DisconnectedError) {}

    async fn notify_error(&self, _err: &Error) {}

    async fn notify_unimplemented(&self, _seq: u32) {}
}
