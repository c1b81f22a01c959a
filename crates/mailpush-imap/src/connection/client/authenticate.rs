//! Running the authentication exchange picked by
//! [`plan_authentication`](crate::connection::plan_authentication).

use super::{Connection, UntaggedHandler};
use crate::command::Command;
use crate::connection::auth::{AuthPlan, OAuthMechanism, plan_authentication};
use crate::connection::stream::Connector;
use crate::error::NegativeResponse;
use crate::oauth::TOKEN_TIMEOUT;
use crate::parser::Response;
use crate::sasl;
use crate::{Error, Result};

/// Response code sent with rejected credentials (RFC 5530).
const AUTHENTICATIONFAILED: &str = "AUTHENTICATIONFAILED";

/// Answers the first continuation with a prepared payload and cancels any
/// further round.
struct SaslExchange {
    payload: Option<String>,
}

impl UntaggedHandler for SaslExchange {
    fn continuation_reply(&mut self, _response: &Response) -> Result<Vec<u8>> {
        Ok(line(self.payload.take().as_deref().unwrap_or("*")))
    }
}

struct CramMd5Exchange {
    username: String,
    password: String,
    answered: bool,
}

impl UntaggedHandler for CramMd5Exchange {
    fn continuation_reply(&mut self, response: &Response) -> Result<Vec<u8>> {
        if std::mem::replace(&mut self.answered, true) {
            return Ok(line("*"));
        }
        let challenge = response.continuation_text().unwrap_or_default();
        let reply = sasl::cram_md5_response(&self.username, &self.password, challenge)?;
        Ok(line(&reply))
    }
}

/// A continuation after a SASL-IR token carries the error details; it is
/// acknowledged with an empty line so the server sends the completion.
struct OAuthExchange {
    retry: bool,
}

impl UntaggedHandler for OAuthExchange {
    fn continuation_reply(&mut self, response: &Response) -> Result<Vec<u8>> {
        self.retry = sasl::should_retry(response.continuation_text().unwrap_or_default());
        Ok(line(""))
    }
}

fn line(text: &str) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(text.len() + 2);
    bytes.extend_from_slice(text.as_bytes());
    bytes.extend_from_slice(b"\r\n");
    bytes
}

/// Maps a rejected login to [`Error::AuthenticationFailed`] unless the server
/// gave a different reason.
fn authentication_error(negative: Box<NegativeResponse>) -> Error {
    match negative.response_code() {
        None => credentials_rejected(&negative),
        Some(code) if code.eq_ignore_ascii_case(AUTHENTICATIONFAILED) => {
            credentials_rejected(&negative)
        }
        Some(_) => Error::Negative(negative),
    }
}

fn credentials_rejected(negative: &NegativeResponse) -> Error {
    let server_message = negative.response_text().map(str::to_string);
    Error::AuthenticationFailed {
        message: server_message
            .clone()
            .unwrap_or_else(|| "credentials rejected".to_string()),
        server_message,
    }
}

impl<C: Connector> Connection<C> {
    /// Authenticates with the mechanism the settings and capabilities call for.
    pub(super) async fn authenticate(&mut self) -> Result<Vec<Response>> {
        let capabilities = self
            .capabilities
            .clone()
            .ok_or_else(|| Error::InvalidState("capabilities unknown".to_string()))?;
        let plan = plan_authentication(&capabilities, &self.settings)?;
        tracing::debug!(conn = %self.log_id, ?plan, "Authenticating");

        match plan {
            AuthPlan::Plain {
                initial_response,
                login_fallback,
            } => self.authenticate_plain(initial_response, login_fallback).await,
            AuthPlan::Login => self.login().await,
            AuthPlan::CramMd5 => self.authenticate_cram_md5().await,
            AuthPlan::OAuth(mechanism) => self.authenticate_oauth(mechanism).await,
            AuthPlan::External => self.authenticate_external().await,
        }
    }

    fn password(&self) -> String {
        self.settings.password.clone().unwrap_or_default()
    }

    async fn authenticate_plain(
        &mut self,
        initial_response: bool,
        login_fallback: bool,
    ) -> Result<Vec<Response>> {
        let payload = sasl::plain_response(&self.settings.username, &self.password());
        let command = Command::Authenticate {
            mechanism: "PLAIN".to_string(),
            initial_response: initial_response.then(|| payload.clone()),
        };
        let mut exchange = SaslExchange {
            payload: (!initial_response).then_some(payload),
        };

        match self.execute_with(&command, &mut exchange).await {
            Err(Error::Negative(negative)) if login_fallback && self.is_open() => {
                tracing::debug!(
                    conn = %self.log_id,
                    response = %negative,
                    "AUTHENTICATE PLAIN rejected, trying LOGIN"
                );
                self.login().await
            }
            Err(Error::Negative(negative)) => Err(authentication_error(negative)),
            result => result,
        }
    }

    async fn login(&mut self) -> Result<Vec<Response>> {
        let command = Command::Login {
            username: self.settings.username.clone(),
            password: self.password(),
        };
        match self.execute(&command).await {
            Err(Error::Negative(negative)) => Err(authentication_error(negative)),
            result => result,
        }
    }

    async fn authenticate_cram_md5(&mut self) -> Result<Vec<Response>> {
        let command = Command::Authenticate {
            mechanism: "CRAM-MD5".to_string(),
            initial_response: None,
        };
        let mut exchange = CramMd5Exchange {
            username: self.settings.username.clone(),
            password: self.password(),
            answered: false,
        };
        match self.execute_with(&command, &mut exchange).await {
            Err(Error::Negative(negative)) => Err(authentication_error(negative)),
            result => result,
        }
    }

    async fn authenticate_oauth(&mut self, mechanism: OAuthMechanism) -> Result<Vec<Response>> {
        let provider = self
            .token_provider
            .clone()
            .ok_or_else(|| Error::Token("no OAuth2 token provider configured".to_string()))?;
        let username = self.settings.username.clone();

        let mut retried = false;
        loop {
            let token = tokio::time::timeout(
                TOKEN_TIMEOUT,
                provider.get_token(&username, TOKEN_TIMEOUT),
            )
            .await
            .map_err(|_| Error::Token("timed out waiting for a token".to_string()))??;

            let initial_response = match mechanism {
                OAuthMechanism::OAuthBearer => sasl::oauthbearer_response(&username, &token),
                OAuthMechanism::XOAuth2 => sasl::xoauth2_response(&username, &token),
            };
            let command = Command::Authenticate {
                mechanism: mechanism.as_str().to_string(),
                initial_response: Some(initial_response),
            };
            let mut exchange = OAuthExchange { retry: true };

            match self.execute_with(&command, &mut exchange).await {
                Err(Error::Negative(negative)) => {
                    provider.invalidate_token(&username);
                    if exchange.retry && !retried && self.is_open() {
                        tracing::debug!(
                            conn = %self.log_id,
                            mechanism = mechanism.as_str(),
                            "Token rejected, retrying with a fresh one"
                        );
                        retried = true;
                        continue;
                    }
                    return Err(credentials_rejected(&negative));
                }
                result => return result,
            }
        }
    }

    async fn authenticate_external(&mut self) -> Result<Vec<Response>> {
        let command = Command::Authenticate {
            mechanism: "EXTERNAL".to_string(),
            initial_response: Some(sasl::external_response(&self.settings.username)),
        };
        match self.execute(&command).await {
            Err(Error::Negative(negative)) => Err(Error::CertificateValidation(
                negative
                    .response_text()
                    .unwrap_or("EXTERNAL authentication rejected")
                    .to_string(),
            )),
            result => result,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::model::test_support::responses;

    fn negative(lines: &[&str]) -> Box<NegativeResponse> {
        Box::new(NegativeResponse::new("LOGIN [sensitive]".to_string(), responses(lines)))
    }

    #[test]
    fn rejected_credentials_without_code() {
        let err = authentication_error(negative(&["A1 NO bad password"]));
        match err {
            Error::AuthenticationFailed {
                message,
                server_message,
            } => {
                assert_eq!(message, "bad password");
                assert_eq!(server_message.as_deref(), Some("bad password"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn rejected_credentials_with_code() {
        let err = authentication_error(negative(&[
            "A1 NO [AUTHENTICATIONFAILED] Invalid credentials",
        ]));
        assert!(err.is_authentication_failure());
    }

    #[test]
    fn other_codes_stay_negative() {
        let err = authentication_error(negative(&["A1 NO [UNAVAILABLE] Try later"]));
        let negative = err.as_negative().unwrap();
        assert_eq!(negative.response_code(), Some("UNAVAILABLE"));
    }

    #[test]
    fn sasl_exchange_answers_once() {
        let continuation = Response::continuation(String::new());
        let mut exchange = SaslExchange {
            payload: Some("AHVzZXIAcGFzcw==".to_string()),
        };
        assert_eq!(
            exchange.continuation_reply(&continuation).unwrap(),
            b"AHVzZXIAcGFzcw==\r\n"
        );
        assert_eq!(exchange.continuation_reply(&continuation).unwrap(), b"*\r\n");
    }

    #[test]
    fn oauth_exchange_reads_status() {
        // {"status":"400","schemes":"Bearer","scope":"https://mail.google.com/"}
        let challenge = Response::continuation(
            "eyJzdGF0dXMiOiI0MDAiLCJzY2hlbWVzIjoiQmVhcmVyIiwic2NvcGUiOiJodHRwczovL21haWwuZ29vZ2xlLmNvbS8ifQ=="
                .to_string(),
        );
        let mut exchange = OAuthExchange { retry: false };
        assert_eq!(exchange.continuation_reply(&challenge).unwrap(), b"\r\n");
        assert!(exchange.retry);
    }
}
