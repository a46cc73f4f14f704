use digest::{Digest, FixedOutputReset};
use secrecy::{ExposeSecret, SecretBox};
use signature::Verifier;
use ssh_key::Signature;
use ssh_packet::{
    arch::MpInt,
    crypto::exchange,
    trans::{KexEcdhInit, KexEcdhReply, KexInit},
    Id,
};

// `v_s` (the peer's identification line) is carried as a raw `&str` rather
// than a parsed `Id`, so the exchange hash binds the exact bytes the peer
// sent (including a possible `SSH-1.99-` spelling) instead of a
// reserialization of it.

use crate::{
    algorithm::{Cipher, Hmac},
    kex::KexIo,
    stream::Pipe,
    transport::Keys,
    Error, Result,
};

/// Runs `curve25519-sha256`/`curve25519-sha256@libssh.org` as the client,
/// verifying the server's host key through `host_key` before deriving keys.
///
/// Returns `(exchange_hash, client_keys, server_keys)` — the caller freezes
/// the exchange hash into the session identifier on the first kex (I5).
#[allow(clippy::too_many_arguments)]
pub async fn as_client<H: Digest + FixedOutputReset>(
    io: &mut KexIo<'_, impl Pipe>,
    v_c: &Id,
    v_s: &str,
    i_c: &KexInit<'_>,
    i_s: &KexInit<'_>,
    client_cipher: &Cipher,
    server_cipher: &Cipher,
    client_hmac: &Hmac,
    server_hmac: &Hmac,
    host_key: &mut dyn FnMut(&ssh_key::PublicKey) -> bool,
) -> Result<(Vec<u8>, Keys, Keys)> {
    let e_c = x25519_dalek::EphemeralSecret::random_from_rng(rand::thread_rng());
    let q_c = x25519_dalek::PublicKey::from(&e_c);

    io.send(KexEcdhInit {
        q_c: q_c.as_ref().into(),
    })
    .await?;

    let ecdh: KexEcdhReply = io.recv().await?.to()?;
    let q_s = x25519_dalek::PublicKey::from(
        <[u8; 32]>::try_from(ecdh.q_s.as_ref()).map_err(|_| Error::KexError)?,
    );

    let secret = e_c.diffie_hellman(&q_s);
    let secret = SecretBox::new(Box::new(MpInt::positive(secret.as_bytes())));

    let k_s = ssh_key::PublicKey::from_bytes(&ecdh.k_s)?;

    let hash = exchange::Ecdh {
        v_c: v_c.to_string().into_bytes().into(),
        v_s: v_s.as_bytes().to_vec().into(),
        i_c: i_c.into(),
        i_s: i_s.into(),
        k_s: ecdh.k_s.clone(),
        q_c: q_c.as_ref().into(),
        q_s: q_s.as_ref().into(),
        k: secret.expose_secret().as_borrow(),
    }
    .hash::<H>();

    Verifier::verify(&k_s, &hash, &Signature::try_from(ecdh.signature.as_ref())?)?;

    if !host_key(&k_s) {
        return Err(Error::HostKeyNotVerifiable);
    }

    let session_id = io.freeze_session_id(&hash);

    Ok((
        session_id.clone(),
        Keys::as_client::<H>(
            secret.expose_secret(),
            &hash,
            &session_id,
            client_cipher,
            client_hmac,
        ),
        Keys::as_server::<H>(
            secret.expose_secret(),
            &hash,
            &session_id,
            server_cipher,
            server_hmac,
        ),
    ))
}
