#![allow(clippy::unwrap_used)]

use async_trait::async_trait;
use ssh_transport::{ClientConfig, DisconnectReason, DisconnectedError, Error, Service, Session};

mod common;

use common::Harness;

/// Stands in for whatever sits above the transport layer (userauth, in a
/// real client) once `req_service` installs it.
#[derive(Default)]
struct UserauthStub;

#[async_trait]
impl Service for UserauthStub {
    fn name(&self) -> &str {
        "ssh-userauth"
    }

    async fn handle(&self, _payload: Vec<u8>) {}

    async fn notify_disconnect(&self, _err: &DisconnectedError) {}

    async fn notify_error(&self, _err: &Error) {}

    async fn notify_unimplemented(&self, _seq: u32) {}
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init()
        .ok();
}

/// A [`ClientConfig`] with a short timeout, so a test that's supposed to
/// hit one (P7) doesn't have to wait out the 30 second production default.
fn test_config() -> ClientConfig {
    ClientConfig {
        timeout: std::time::Duration::from_secs(5),
        ..Default::default()
    }
}

#[tokio::test]
async fn end_to_end() {
    init_tracing();

    let (client_io, server_io) = common::duplex();
    let harness = Harness::new();

    let server = tokio::spawn(async move { harness.run(server_io).await });

    let client = Session::init(client_io, test_config())
        .await
        .expect("version exchange");

    assert!(client.session_id().is_none());
    assert!(!client.is_authenticated());

    client.add_host_key_verifier(|_key| true);
    client.do_kex().await.expect("initial kex");

    assert!(client.session_id().is_some());

    client
        .req_service("ssh-userauth", UserauthStub)
        .await
        .expect("service request accepted");

    client
        .disconnect(DisconnectReason::ByApplication, "bye")
        .await;

    client.join().await.expect("graceful disconnect");

    let reason = server.await.expect("harness task panicked");
    assert!(matches!(reason, Some(DisconnectReason::ByApplication)));
}

#[tokio::test]
async fn req_service_times_out_without_a_service_accept() {
    init_tracing();

    let (client_io, server_io) = common::duplex();
    let harness = Harness::new();

    let server = tokio::spawn(async move {
        harness.run_withholding_service_accept(server_io).await;
    });

    let mut config = test_config();
    config.timeout = std::time::Duration::from_millis(200);

    let client = Session::init(client_io, config)
        .await
        .expect("version exchange");

    client.add_host_key_verifier(|_key| true);
    client.do_kex().await.expect("initial kex");

    let result = client.req_service("ssh-userauth", UserauthStub).await;
    assert!(matches!(result, Err(Error::Timeout)));

    server.abort();
}

#[tokio::test]
async fn unknown_transport_message_gets_unimplemented() {
    init_tracing();

    let (client_io, server_io) = common::duplex();
    let harness = Harness::new();

    let server =
        tokio::spawn(async move { harness.run_sending_unknown_message(server_io).await });

    let client = Session::init(client_io, test_config())
        .await
        .expect("version exchange");

    client.add_host_key_verifier(|_key| true);
    client.do_kex().await.expect("initial kex");

    // the harness asserts the UNIMPLEMENTED it receives references its own
    // sequence number (P8); just wait for it to finish scripting that.
    server.await.expect("harness task panicked");
}

#[tokio::test]
async fn host_key_rejected_without_a_verifier() {
    init_tracing();

    let (client_io, server_io) = common::duplex();
    let harness = Harness::new();

    let server = tokio::spawn(async move { harness.run(server_io).await });

    // version exchange alone never touches the host key; only a kex does,
    // and with no verifier registered every key is rejected fail-closed.
    let client = Session::init(client_io, test_config())
        .await
        .expect("version exchange");

    let result = client.do_kex().await;
    assert!(matches!(result, Err(Error::HostKeyNotVerifiable)));

    // the harness is left mid-handshake; drop its task rather than block on
    // a reply that will never come.
    server.abort();
}
