//! Byte-at-a-time scan of the peer's identification line (RFC 4253 §4.2).
//!
//! `ssh_packet::Id` knows how to parse and serialize an identification
//! string once handed one, but enforces none of the size limits a transport
//! has to defend against on an otherwise untrusted peer: this module reads
//! the banner directly off the wire, rejecting oversized or malformed input
//! before a single `SSH-` line is accepted.

use futures::{AsyncRead, AsyncReadExt};

use crate::{Error, Result};

/// Bytes of header accepted (MOTD lines and the like) before a valid
/// `SSH-` line must appear.
const MAX_HEADER: usize = 16 * 1024;

/// Longest single line accepted, including the identification line itself.
const MAX_LINE: usize = 256;

/// Scan `reader` for the peer's identification line, skipping any number of
/// preceding non-`SSH-` lines, and return it verbatim (without the trailing
/// CRLF).
///
/// Fails with [`Error::BannerFraming`] on a bare LF, an oversized line, or
/// an oversized pre-`SSH-` header, and with [`Error::UnsupportedVersion`] if
/// the accepted line doesn't start with `SSH-2.0-` or `SSH-1.99-`.
pub(crate) async fn read(reader: &mut (impl AsyncRead + Unpin)) -> Result<String> {
    let mut header = 0usize;
    let mut line = Vec::new();

    loop {
        let mut byte = [0u8];
        if reader.read(&mut byte).await? == 0 {
            return Err(Error::BannerFraming(
                "connection closed before an identification line was received".into(),
            ));
        }
        let byte = byte[0];

        header += 1;
        if header > MAX_HEADER {
            return Err(Error::BannerFraming(
                "identification header exceeded the 16 KiB limit".into(),
            ));
        }

        if byte == b'\n' {
            if line.last().copied() != Some(b'\r') {
                return Err(Error::BannerFraming(
                    "identification line terminated by a bare LF".into(),
                ));
            }
            line.pop();

            if line.starts_with(b"SSH-") {
                let text = String::from_utf8(line).map_err(|_| {
                    Error::BannerFraming("identification line is not valid UTF-8".into())
                })?;

                return if text.starts_with("SSH-2.0-") || text.starts_with("SSH-1.99-") {
                    Ok(text)
                } else {
                    Err(Error::UnsupportedVersion(text))
                };
            }

            line.clear();
        } else {
            line.push(byte);

            if line.len() > MAX_LINE {
                return Err(Error::BannerFraming(
                    "identification line exceeded the 256 byte limit".into(),
                ));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::io::Cursor;

    async fn scan(input: &[u8]) -> Result<String> {
        let mut cursor = Cursor::new(input.to_vec());
        read(&mut cursor).await
    }

    #[tokio::test]
    async fn accepts_plain_banner() {
        assert_eq!(
            scan(b"SSH-2.0-OpenSSH_8.9\r\n").await.unwrap(),
            "SSH-2.0-OpenSSH_8.9"
        );
    }

    #[tokio::test]
    async fn skips_leading_motd() {
        assert_eq!(
            scan(b"Some-MOTD\r\nSSH-2.0-X\r\n").await.unwrap(),
            "SSH-2.0-X"
        );
    }

    #[tokio::test]
    async fn accepts_1_99() {
        assert_eq!(
            scan(b"SSH-1.99-Legacy\r\n").await.unwrap(),
            "SSH-1.99-Legacy"
        );
    }

    #[tokio::test]
    async fn rejects_unsupported_version() {
        let err = scan(b"SSH-1.5-Old\r\n").await.unwrap_err();
        assert!(matches!(err, Error::UnsupportedVersion(_)));
    }

    #[tokio::test]
    async fn rejects_bare_lf() {
        let err = scan(b"SSH-2.0-X\n").await.unwrap_err();
        assert!(matches!(err, Error::BannerFraming(_)));
    }

    #[tokio::test]
    async fn rejects_oversized_line() {
        let mut input = vec![b'a'; 300];
        input.extend_from_slice(b"\r\n");

        let err = scan(&input).await.unwrap_err();
        assert!(matches!(err, Error::BannerFraming(_)));
    }

    #[tokio::test]
    async fn rejects_oversized_header() {
        // Many short MOTD lines summing past the 16 KiB header cap, none of
        // them individually over the 256 byte line cap.
        let input = b"x\r\n".repeat(6000);

        let err = scan(&input).await.unwrap_err();
        assert!(matches!(err, Error::BannerFraming(_)));
    }
}
