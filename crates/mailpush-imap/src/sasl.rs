//! SASL authentication mechanisms.
//!
//! Implements:
//! - PLAIN (RFC 4616) - Basic username/password authentication
//! - CRAM-MD5 (RFC 2195) - Challenge/response with a keyed MD5 digest
//! - OAUTHBEARER (RFC 7628) - Standard `OAuth2` authentication
//! - XOAUTH2 (Google/Microsoft proprietary) - Legacy `OAuth2` authentication
//! - EXTERNAL (RFC 4422) - Identity established by the TLS client certificate

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use hmac::{Hmac, Mac};
use md5::Md5;

use crate::error::{Error, Result};

type HmacMd5 = Hmac<Md5>;

/// Generates PLAIN initial response (RFC 4616).
///
/// Format: `\0<username>\0<password>` (base64 encoded)
///
/// # Example
///
/// ```
/// use mailpush_imap::sasl::plain_response;
///
/// assert_eq!(plain_response("test", "pass"), "AHRlc3QAcGFzcw==");
/// ```
#[must_use]
pub fn plain_response(username: &str, password: &str) -> String {
    // The first NUL is for the authorization identity (empty = same as auth identity)
    let auth_string = format!("\0{username}\0{password}");
    STANDARD.encode(auth_string.as_bytes())
}

/// Computes the CRAM-MD5 answer to a base64 challenge (RFC 2195).
///
/// The decoded challenge is signed with HMAC-MD5 keyed by the password and the
/// answer `<username> <hex digest>` is returned base64 encoded.
///
/// # Errors
///
/// Returns [`Error::Protocol`] if the challenge is not valid base64.
pub fn cram_md5_response(username: &str, password: &str, challenge: &str) -> Result<String> {
    let nonce = STANDARD
        .decode(challenge.trim())
        .map_err(|e| Error::Protocol(format!("invalid CRAM-MD5 challenge: {e}")))?;

    let mut mac = HmacMd5::new_from_slice(password.as_bytes())
        .map_err(|e| Error::Protocol(format!("invalid CRAM-MD5 key: {e}")))?;
    mac.update(&nonce);
    let digest = mac.finalize().into_bytes();

    let hex: String = digest.iter().map(|b| format!("{b:02x}")).collect();
    Ok(STANDARD.encode(format!("{username} {hex}")))
}

/// Generates OAUTHBEARER initial response (RFC 7628).
///
/// Format: `n,a=<user>,\x01auth=Bearer <token>\x01\x01`
#[must_use]
pub fn oauthbearer_response(user: &str, token: &str) -> String {
    let auth_string = format!("n,a={user},\x01auth=Bearer {token}\x01\x01");
    STANDARD.encode(auth_string.as_bytes())
}

/// Generates XOAUTH2 initial response (Google/Microsoft proprietary).
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

/// `OAuth2` error sent by the server in a continuation request.
///
/// `{"status":"401", "schemes":"bearer", "scope":"..."}`, base64 encoded on
/// the wire. Some servers send the status as a number.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct OAuthError {
    /// HTTP-like status code.
    #[serde(default)]
    pub status: Option<serde_json::Value>,
    /// Authentication schemes supported.
    #[serde(default)]
    pub schemes: Option<String>,
    /// `OAuth2` scope required.
    #[serde(default)]
    pub scope: Option<String>,
}

impl OAuthError {
    /// Decodes a base64 continuation payload.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] if the payload is not base64 encoded JSON.
    pub fn decode(challenge: &str) -> Result<Self> {
        let json = STANDARD
            .decode(challenge.trim())
            .map_err(|e| Error::Protocol(format!("invalid OAuth challenge: {e}")))?;
        serde_json::from_slice(&json)
            .map_err(|e| Error::Protocol(format!("invalid OAuth challenge: {e}")))
    }

    /// Status code as text.
    #[must_use]
    pub fn status_code(&self) -> Option<String> {
        match self.status.as_ref()? {
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }
}

/// Decides whether a failed `OAuth2` attempt is worth retrying with a fresh token.
///
/// Statuses 400 and 401 point at an expired or revoked token. A payload that
/// cannot be decoded or lacks a status is retried as well; any other status
/// is treated as permanent.
#[must_use]
pub fn should_retry(challenge: &str) -> bool {
    match OAuthError::decode(challenge) {
        Ok(error) => match error.status_code() {
            Some(status) => {
                tracing::debug!(%status, "OAuth challenge");
                status == "400" || status == "401"
            }
            None => true,
        },
        Err(e) => {
            tracing::warn!(?e, "Unable to decode OAuth challenge");
            true
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn decode(response: &str) -> String {
        String::from_utf8(STANDARD.decode(response).unwrap()).unwrap()
    }

    #[test]
    fn test_plain_response_format() {
        assert_eq!(decode(&plain_response("test", "pass")), "\0test\0pass");
        assert_eq!(
            decode(&plain_response("user", "pass@word!")),
            "\0user\0pass@word!"
        );
    }

    #[test]
    fn test_cram_md5_rfc2195_vector() {
        let response = cram_md5_response(
            "tim",
            "tanstaaftanstaaf",
            "PDE4OTYuNjk3MTcwOTUyQHBvc3RvZmZpY2UucmVzdG9uLm1jaS5uZXQ+",
        )
        .unwrap();
        assert_eq!(response, "dGltIGI5MTNhNjAyYzdlZGE3YTQ5NWI0ZTZlNzMzNGQzODkw");
        assert_eq!(decode(&response), "tim b913a602c7eda7a495b4e6e7334d3890");
    }

    #[test]
    fn test_cram_md5_invalid_challenge() {
        assert!(matches!(
            cram_md5_response("tim", "secret", "%%%"),
            Err(Error::Protocol(_))
        ));
    }

    #[test]
    fn test_oauthbearer_format() {
        assert_eq!(
            decode(&oauthbearer_response("test@test.com", "abc")),
            "n,a=test@test.com,\x01auth=Bearer abc\x01\x01"
        );
    }

    #[test]
    fn test_xoauth2_format() {
        assert_eq!(
            decode(&xoauth2_response("test@test.com", "abc")),
            "user=test@test.com\x01auth=Bearer abc\x01\x01"
        );
    }

    #[test]
    fn test_external_response() {
        assert_eq!(external_response("user"), "dXNlcg==");
    }

    #[test]
    fn test_decode_oauth_error() {
        let json = r#"{"status":"401","schemes":"bearer","scope":"https://mail.google.com/"}"#;
        let error = OAuthError::decode(&STANDARD.encode(json)).unwrap();
        assert_eq!(error.status_code().as_deref(), Some("401"));
        assert_eq!(error.schemes.as_deref(), Some("bearer"));
        assert_eq!(error.scope.as_deref(), Some("https://mail.google.com/"));
    }

    #[test]
    fn test_should_retry() {
        let challenge = |json: &str| STANDARD.encode(json);
        assert!(should_retry(&challenge(r#"{"status":"400","schemes":"Bearer"}"#)));
        assert!(should_retry(&challenge(r#"{"status":401}"#)));
        assert!(!should_retry(&challenge(r#"{"status":"500","schemes":"Bearer"}"#)));
        assert!(should_retry(&challenge(r#"{"schemes":"Bearer"}"#)));
        assert!(should_retry(&challenge("not json")));
        assert!(should_retry("!!!"));
    }
}
