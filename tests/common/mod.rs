//! A minimal hand-rolled SSH server, standing in for a real peer so the
//! client transport can be exercised end-to-end over an in-memory duplex
//! pipe rather than a TCP socket.
//!
//! Only `curve25519-sha256`/`ssh-ed25519`/`none` are spoken here: enough to
//! drive a full version exchange, key exchange and host-key verification
//! without reimplementing this crate's cipher/hmac/compression suite on the
//! server side too.

use futures::io::BufReader;
use rand::RngCore;
use secrecy::ExposeSecret;
use signature::{SignatureEncoding, Signer};
use ssh_packet::{
    arch::{MpInt, NameList},
    crypto::exchange,
    trans::{
        Disconnect, DisconnectReason, KexEcdhInit, KexEcdhReply, KexInit, NewKeys, ServiceAccept,
        ServiceRequest, Unimplemented,
    },
    Id, Packet,
};
use ssh_transport::{Decoder, Encoder, Pipe};
use tokio_util::compat::TokioAsyncReadCompatExt;

/// Build a pair of connected in-memory pipes, one for the client under
/// test and one for the [`Harness`] standing in for its peer.
pub fn duplex() -> (impl Pipe, impl Pipe) {
    let (a, b) = tokio::io::duplex(64 * 1024);

    (BufReader::new(a.compat()), BufReader::new(b.compat()))
}

async fn read_banner(io: &mut (impl futures::AsyncRead + Unpin)) -> String {
    use futures::AsyncReadExt;

    let mut line = Vec::new();
    loop {
        let mut byte = [0u8];
        io.read_exact(&mut byte)
            .await
            .expect("peer closed during banner exchange");

        if byte[0] == b'\n' {
            if line.last().copied() == Some(b'\r') {
                line.pop();
            }
            return String::from_utf8(line).expect("banner is not utf8");
        }

        line.push(byte[0]);
    }
}

/// A scripted test double for the server side of one SSH session: drives
/// the `curve25519-sha256` handshake against the real client code under
/// test, then plays through the request/accept/disconnect parts of the
/// end-to-end scenario.
pub struct Harness {
    id: Id,
    host_key: ssh_key::PrivateKey,
}

impl Harness {
    pub fn new() -> Self {
        Self {
            id: Id::v2("ssh-transport-harness", None::<&str>),
            host_key: ssh_key::PrivateKey::random(
                &mut rand::thread_rng(),
                ssh_key::Algorithm::Ed25519,
            )
            .expect("ed25519 keygen"),
        }
    }

    pub fn host_key(&self) -> ssh_key::PublicKey {
        self.host_key.public_key().clone()
    }

    /// Run the server side of the handshake and the scripted end-to-end
    /// scenario over `io`, returning the final `SSH_MSG_DISCONNECT` reason
    /// sent by the client (or `None` if the peer just closed the pipe).
    pub async fn run(&self, mut io: impl Pipe) -> Option<DisconnectReason> {
        let (mut decoder, mut encoder) = self.handshake(&mut io).await;

        let request: ServiceRequest = decoder
            .decode(&mut io)
            .await
            .expect("decode SERVICE_REQUEST")
            .to()
            .expect("SERVICE_REQUEST");

        encoder
            .encode(
                &mut io,
                ServiceAccept {
                    service_name: request.service_name,
                },
            )
            .await
            .expect("send SERVICE_ACCEPT");

        let packet = match decoder.decode(&mut io).await {
            Ok(packet) => packet,
            Err(_) => return None,
        };

        packet.to::<Disconnect>().ok().map(|d| d.reason)
    }

    /// Complete the handshake, then receive (and silently drop, never
    /// sending `SERVICE_ACCEPT`) the client's `SERVICE_REQUEST` — exercises
    /// `reqService`'s timeout path (P7).
    pub async fn run_withholding_service_accept(&self, mut io: impl Pipe) {
        let (mut decoder, _encoder) = self.handshake(&mut io).await;

        let _request: ServiceRequest = decoder
            .decode(&mut io)
            .await
            .expect("decode SERVICE_REQUEST")
            .to()
            .expect("SERVICE_REQUEST");

        // hold the pipe open without replying until the test drops it.
        std::future::pending::<()>().await;
    }

    /// Complete the handshake, then send a transport-range message id that
    /// isn't assigned to anything this layer recognises, and check the
    /// client replies with `SSH_MSG_UNIMPLEMENTED` referencing its sequence
    /// number (P8).
    pub async fn run_sending_unknown_message(&self, mut io: impl Pipe) -> Unimplemented {
        let (mut decoder, mut encoder) = self.handshake(&mut io).await;

        let seq = encoder
            .encode(&mut io, Packet { payload: vec![7] })
            .await
            .expect("send unassigned transport message");

        let reply: Unimplemented = decoder
            .decode(&mut io)
            .await
            .expect("decode UNIMPLEMENTED")
            .to()
            .expect("UNIMPLEMENTED");

        assert_eq!(reply.seq, seq, "UNIMPLEMENTED must reference our sequence number");

        reply
    }

    /// Version exchange plus the `curve25519-sha256` handshake, common to
    /// every scripted continuation above. Returns the decoder/encoder ready
    /// to read/write the now-encrypted (here: `none`-everything) stream.
    async fn handshake(&self, io: &mut impl Pipe) -> (Decoder, Encoder) {
        use futures::AsyncWriteExt;

        self.id.to_async_writer(&mut *io).await.expect("send banner");
        io.flush().await.expect("flush banner");

        let v_c = read_banner(io).await;
        let v_s = self.id.to_string();

        let mut decoder = Decoder::default();
        let mut encoder = Encoder::default();

        let i_c: KexInit<'static> = decoder
            .decode(io)
            .await
            .expect("decode client KEXINIT")
            .to()
            .expect("client KEXINIT");

        let mut cookie = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut cookie);

        let i_s = KexInit {
            cookie,
            kex_algorithms: NameList::from_iter(["curve25519-sha256"]),
            server_host_key_algorithms: NameList::from_iter(["ssh-ed25519"]),
            encryption_algorithms_client_to_server: NameList::from_iter(["none"]),
            encryption_algorithms_server_to_client: NameList::from_iter(["none"]),
            mac_algorithms_client_to_server: NameList::from_iter(["none"]),
            mac_algorithms_server_to_client: NameList::from_iter(["none"]),
            compression_algorithms_client_to_server: NameList::from_iter(["none"]),
            compression_algorithms_server_to_client: NameList::from_iter(["none"]),
            languages_client_to_server: Default::default(),
            languages_server_to_client: Default::default(),
            first_kex_packet_follows: false.into(),
        };
        encoder
            .encode(io, i_s.clone())
            .await
            .expect("send server KEXINIT");

        let ecdh: KexEcdhInit = decoder
            .decode(io)
            .await
            .expect("decode KEXECDHINIT")
            .to()
            .expect("KEXECDHINIT");

        let e_s = x25519_dalek::EphemeralSecret::random_from_rng(rand::thread_rng());
        let q_s = x25519_dalek::PublicKey::from(&e_s);
        let q_c = x25519_dalek::PublicKey::from(
            <[u8; 32]>::try_from(ecdh.q_c.as_ref()).expect("q_c is 32 bytes"),
        );

        let secret = e_s.diffie_hellman(&q_c);
        let secret = secrecy::SecretBox::new(Box::new(MpInt::positive(secret.as_bytes())));

        let k_s = self
            .host_key
            .public_key()
            .to_bytes()
            .expect("encode host key");

        let hash = exchange::Ecdh {
            v_c: v_c.clone().into_bytes().into(),
            v_s: v_s.clone().into_bytes().into(),
            i_c: (&i_c).into(),
            i_s: (&i_s).into(),
            k_s: k_s.as_slice().into(),
            q_c: q_c.as_ref().into(),
            q_s: q_s.as_ref().into(),
            k: secret.expose_secret().as_borrow(),
        }
        .hash::<sha2::Sha256>();

        let signature = Signer::sign(&self.host_key, &hash);

        encoder
            .encode(
                io,
                KexEcdhReply {
                    k_s: k_s.into(),
                    q_s: q_s.as_ref().into(),
                    signature: signature.to_vec().into(),
                },
            )
            .await
            .expect("send KEXECDHREPLY");

        encoder
            .encode(io, NewKeys)
            .await
            .expect("send NEWKEYS");

        decoder
            .decode(io)
            .await
            .expect("decode NEWKEYS")
            .to::<NewKeys>()
            .expect("client NEWKEYS");

        (decoder, encoder)
    }
}
