//! Choice of authentication mechanism.
//!
//! The decision depends only on the advertised capabilities and the account
//! settings, so it lives apart from the connection and can be tested without
//! a server.

use super::config::{AuthType, ImapSettings};
use crate::types::Capabilities;
use crate::types::capability::names;
use crate::{Error, Result};

/// `OAuth2` SASL mechanism.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OAuthMechanism {
    /// `OAUTHBEARER` (RFC 7628).
    OAuthBearer,
    /// `XOAUTH2`.
    XOAuth2,
}

impl OAuthMechanism {
    /// Mechanism name as sent with AUTHENTICATE.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::OAuthBearer => "OAUTHBEARER",
            Self::XOAuth2 => "XOAUTH2",
        }
    }
}

/// How a connection will authenticate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthPlan {
    /// `AUTHENTICATE PLAIN`, with LOGIN as fallback when permitted.
    Plain {
        /// Send the credentials with the command (SASL-IR).
        initial_response: bool,
        /// LOGIN may be tried if the server rejects PLAIN.
        login_fallback: bool,
    },
    /// `LOGIN`.
    Login,
    /// `AUTHENTICATE CRAM-MD5`.
    CramMd5,
    /// `AUTHENTICATE OAUTHBEARER` or `XOAUTH2` with a bearer token.
    OAuth(OAuthMechanism),
    /// `AUTHENTICATE EXTERNAL`.
    External,
}

/// Picks the mechanism for `settings` given the server `capabilities`.
///
/// # Errors
///
/// [`Error::MissingCapability`] when the configured mechanism is not offered,
/// and [`Error::CertificateValidation`] when only LOGIN would remain but the
/// server has disabled it.
pub fn plan_authentication(capabilities: &Capabilities, settings: &ImapSettings) -> Result<AuthPlan> {
    match settings.auth_type {
        AuthType::Plain => {
            let login_disabled = capabilities.contains(names::LOGINDISABLED);
            if capabilities.contains(names::AUTH_PLAIN) {
                Ok(AuthPlan::Plain {
                    initial_response: capabilities.contains(names::SASL_IR),
                    login_fallback: !login_disabled,
                })
            } else if login_disabled {
                Err(Error::CertificateValidation("LOGIN is disabled".to_string()))
            } else {
                Ok(AuthPlan::Login)
            }
        }
        AuthType::CramMd5 => {
            if capabilities.contains(names::AUTH_CRAM_MD5) {
                Ok(AuthPlan::CramMd5)
            } else {
                Err(Error::MissingCapability(names::AUTH_CRAM_MD5.to_string()))
            }
        }
        AuthType::XOAuth2 => {
            if !capabilities.contains(names::SASL_IR) {
                return Err(Error::MissingCapability(names::SASL_IR.to_string()));
            }
            if capabilities.contains(names::AUTH_OAUTHBEARER) {
                Ok(AuthPlan::OAuth(OAuthMechanism::OAuthBearer))
            } else if capabilities.contains(names::AUTH_XOAUTH2)
                || capabilities.contains(names::AUTH_XOAUTH)
            {
                Ok(AuthPlan::OAuth(OAuthMechanism::XOAuth2))
            } else {
                Err(Error::MissingCapability(names::AUTH_XOAUTH2.to_string()))
            }
        }
        AuthType::External => {
            if capabilities.contains(names::AUTH_EXTERNAL) {
                Ok(AuthPlan::External)
            } else {
                Err(Error::MissingCapability(names::AUTH_EXTERNAL.to_string()))
            }
        }
    }
}
