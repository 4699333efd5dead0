//! SASL authentication mechanisms.
//!
//! Implements:
//! - PLAIN (RFC 4616) - Basic username/password authentication
//! - CRAM-MD5 (RFC 2195) - Challenge/response with a keyed MD5 digest
//! - EXTERNAL (RFC 4422) - Identity established by the TLS client certificate
//! - XOAUTH2 (Google/Microsoft proprietary) - `OAuth2` bearer token
//!
//! plus the POP3 APOP digest (RFC 1939), which shares the MD5 machinery.

use std::fmt::Write as _;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use hmac::{Hmac, Mac};
use md5::{Digest, Md5};

use crate::{Error, Result};

type HmacMd5 = Hmac<Md5>;

/// SASL mechanism names as advertised by servers.
pub mod mechanism {
    /// `PLAIN`
    pub const PLAIN: &str = "PLAIN";
    /// `CRAM-MD5`
    pub const CRAM_MD5: &str = "CRAM-MD5";
    /// `EXTERNAL`
    pub const EXTERNAL: &str = "EXTERNAL";
    /// `XOAUTH2`
    pub const XOAUTH2: &str = "XOAUTH2";
}

/// Generates PLAIN initial response (RFC 4616).
///
/// Format: `\0<username>\0<password>` (base64 encoded). The authorization
/// identity is left empty so it defaults to the authentication identity.
///
/// # Example
///
/// ```
/// use mailsync_net::sasl::plain_response;
///
/// assert_eq!(plain_response("test", "pass"), "AHRlc3QAcGFzcw==");
/// ```
#[must_use]
pub fn plain_response(username: &str, password: &str) -> String {
    let auth_string = format!("\0{username}\0{password}");
    STANDARD.encode(auth_string.as_bytes())
}

/// Generates XOAUTH2 initial response.
///
/// Format: `user=<user>\x01auth=Bearer <token>\x01\x01`
#[must_use]
pub fn xoauth2_response(user: &str, token: &str) -> String {
    let auth_string = format!("user={user}\x01auth=Bearer {token}\x01\x01");
    STANDARD.encode(auth_string.as_bytes())
}

/// Generates EXTERNAL initial response: the base64 encoded username.
#[must_use]
pub fn external_response(username: &str) -> String {
    STANDARD.encode(username.as_bytes())
}

/// Answers a CRAM-MD5 challenge (RFC 2195).
///
/// `challenge` is the base64 text sent by the server after the continuation
/// marker. The answer is `base64("<username> <hex hmac-md5(password, challenge)>")`.
///
/// # Errors
///
/// Returns [`Error::InvalidChallenge`] if the challenge is not valid base64.
pub fn cram_md5_response(username: &str, password: &str, challenge: &str) -> Result<String> {
    let challenge = STANDARD
        .decode(challenge.trim())
        .map_err(|e| Error::InvalidChallenge(e.to_string()))?;

    let mut mac = HmacMd5::new_from_slice(password.as_bytes())
        .map_err(|e| Error::InvalidChallenge(e.to_string()))?;
    mac.update(&challenge);
    let digest = mac.finalize().into_bytes();

    let answer = format!("{username} {}", to_hex(&digest));
    Ok(STANDARD.encode(answer.as_bytes()))
}

/// Computes the APOP digest: hex `md5(<timestamp><password>)`.
///
/// `timestamp` includes the angle brackets as sent in the POP3 greeting.
#[must_use]
pub fn apop_digest(timestamp: &str, password: &str) -> String {
    let mut hasher = Md5::new();
    hasher.update(timestamp.as_bytes());
    hasher.update(password.as_bytes());
    to_hex(&hasher.finalize())
}

/// Decodes a base64 server challenge into text, for logging and errors.
#[must_use]
pub fn decode_challenge(challenge: &str) -> Option<String> {
    let bytes = STANDARD.decode(challenge.trim()).ok()?;
    Some(String::from_utf8_lossy(&bytes).into_owned())
}

fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().fold(String::with_capacity(bytes.len() * 2), |mut out, b| {
        let _ = write!(out, "{b:02x}");
        out
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_response_format() {
        let response = plain_response("test", "pass");
        let decoded = String::from_utf8(STANDARD.decode(&response).unwrap()).unwrap();
        assert_eq!(decoded, "\0test\0pass");
    }

    #[test]
    fn test_xoauth2_format() {
        let response = xoauth2_response("test@test.com", "abc");
        let decoded = String::from_utf8(STANDARD.decode(&response).unwrap()).unwrap();
        assert_eq!(decoded, "user=test@test.com\x01auth=Bearer abc\x01\x01");
    }

    #[test]
    fn test_external_response() {
        assert_eq!(external_response("user"), "dXNlcg==");
    }

    #[test]
    fn test_cram_md5_rfc2195_example() {
        // Example exchange from RFC 2195 section 2.
        let challenge = STANDARD.encode("<1896.697170952@postoffice.reston.mci.net>");
        let response = cram_md5_response("tim", "tanstaaftanstaaf", &challenge).unwrap();
        let decoded = String::from_utf8(STANDARD.decode(&response).unwrap()).unwrap();
        assert_eq!(decoded, "tim b913a602c7eda7a495b4e6e7334d3890");
    }

    #[test]
    fn test_cram_md5_invalid_challenge() {
        let err = cram_md5_response("tim", "secret", "not base64!").unwrap_err();
        assert!(matches!(err, Error::InvalidChallenge(_)));
    }

    #[test]
    fn test_apop_rfc1939_example() {
        // Example exchange from RFC 1939 section 7.
        let digest = apop_digest("<1896.697170952@dbc.mtview.ca.us>", "tanstaaf");
        assert_eq!(digest, "c4c9334bac560ecc979e58001b3e22fb");
    }

    #[test]
    fn test_decode_challenge() {
        assert_eq!(decode_challenge("aGVsbG8=").as_deref(), Some("hello"));
        assert_eq!(decode_challenge("%%%"), None);
    }
}
