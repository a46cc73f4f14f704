//! Algorithm implementations for **key-exchange**, **encryption**, **integrity** and
//! **compression**, negotiated during the SSH key-exchange.

// TODO: (feature) Gate insecure algorithms (3des-cbc, hmac-md5, hmac-sha1) behind an `insecure` feature flag.

pub(crate) mod cipher;
pub use cipher::Cipher;
pub(crate) use cipher::CipherState;

pub(crate) mod compress;
pub use compress::Compress;

pub(crate) mod hmac;
pub use hmac::Hmac;

pub(crate) mod kex;
pub use kex::Kex;

pub(crate) mod key;
pub use key::Key;
