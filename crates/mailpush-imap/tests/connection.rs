//! Integration tests for [`Connection`] against a scripted server.
//!
//! Each test queues a pipe on a [`MockConnector`], then runs the client and
//! the server script side by side with `tokio::join!`.

#![allow(clippy::unwrap_used)]

mod mock_server;

use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use mailpush_imap::connection::{AuthType, ClientInfo, Connection, ConnectionState, Security};
use mailpush_imap::parser::keyword;
use mailpush_imap::{Error, IdSelection, IdSet, ImapSettings, SequenceCommand};
use mock_server::{CountingTokenProvider, MockConnector, PLAIN_PAYLOAD, settings};

fn connection(connector: &Arc<MockConnector>, settings: ImapSettings) -> Connection<MockConnector> {
    Connection::new(settings, Arc::clone(connector))
}

// ── Opening ────────────────────────────────────────────────────────

#[tokio::test]
async fn test_open_reaches_ready() {
    let connector = MockConnector::new();
    let mut server = connector.accept();
    let mut conn = connection(&connector, settings());

    let (result, ()) = tokio::join!(conn.open(), server.serve_login("IMAP4rev1 IDLE UIDPLUS"));

    result.unwrap();
    assert_eq!(conn.state(), ConnectionState::Ready);
    assert!(conn.has_capability("idle"));
    assert!(conn.has_capability("UIDPLUS"));
    assert!(!conn.has_capability("AUTH=PLAIN"));
    assert_eq!(conn.path_prefix(), Some(""));
    assert_eq!(conn.path_delimiter(), Some("/"));
    assert!(!conn.is_compressed());
}

#[tokio::test]
async fn test_open_twice_is_a_no_op() {
    let connector = MockConnector::new();
    let mut server = connector.accept();
    let mut conn = connection(&connector, settings());

    let (result, ()) = tokio::join!(conn.open(), server.serve_login("IMAP4rev1"));
    result.unwrap();

    // No second pipe is queued, so any reconnect attempt would fail.
    conn.open().await.unwrap();
    assert_eq!(conn.state(), ConnectionState::Ready);
}

#[tokio::test]
async fn test_capabilities_requested_when_not_announced() {
    let connector = MockConnector::new();
    let mut server = connector.accept();
    let mut conn = connection(&connector, settings());

    let script = async {
        // Greeting without capabilities forces an explicit CAPABILITY.
        server.send("* OK server ready").await;
        let tag = server.expect("CAPABILITY").await;
        server.send("* CAPABILITY IMAP4rev1 AUTH=PLAIN SASL-IR").await;
        server.send(&format!("{tag} OK CAPABILITY completed")).await;

        let tag = server
            .expect(&format!("AUTHENTICATE PLAIN {PLAIN_PAYLOAD}"))
            .await;
        // No capabilities in the completion: the client asks again.
        server.send(&format!("{tag} OK Logged in")).await;
        let tag = server.expect("CAPABILITY").await;
        server.send("* CAPABILITY IMAP4rev1 IDLE").await;
        server.send(&format!("{tag} OK CAPABILITY completed")).await;

        server.serve_delimiter(".").await;
    };
    let (result, ()) = tokio::join!(conn.open(), script);

    result.unwrap();
    assert!(conn.has_capability("IDLE"));
    assert_eq!(conn.path_delimiter(), Some("."));
}

#[tokio::test]
async fn test_preauth_skips_login() {
    let connector = MockConnector::new();
    let mut server = connector.accept();
    let mut conn = connection(&connector, settings());

    let script = async {
        server.send("* PREAUTH [CAPABILITY IMAP4rev1 IDLE] welcome back").await;
        server.serve_delimiter("/").await;
    };
    let (result, ()) = tokio::join!(conn.open(), script);

    result.unwrap();
    assert_eq!(conn.state(), ConnectionState::Ready);
}

#[tokio::test]
async fn test_bye_greeting() {
    let connector = MockConnector::new();
    let mut server = connector.accept();
    let mut conn = connection(&connector, settings());

    let (result, ()) = tokio::join!(conn.open(), server.send("* BYE too many connections"));

    match result {
        Err(Error::Bye(text)) => assert_eq!(text, "too many connections"),
        other => panic!("unexpected result: {other:?}"),
    }
    assert_eq!(conn.state(), ConnectionState::Closed);
}

#[tokio::test]
async fn test_connect_failure_closes() {
    let connector = MockConnector::new();
    let mut conn = connection(&connector, settings());

    let err = conn.open().await.unwrap_err();

    assert!(err.is_transport());
    assert!(err.to_string().starts_with("Cannot connect to host imap.test:143"));
    assert_eq!(conn.state(), ConnectionState::Closed);
}

// ── Closing ────────────────────────────────────────────────────────

#[tokio::test]
async fn test_close_before_open_and_twice() {
    let connector = MockConnector::new();
    let mut conn = connection(&connector, settings());

    conn.close();
    conn.close();
    assert_eq!(conn.state(), ConnectionState::Closed);

    match conn.open().await {
        Err(Error::InvalidState(_)) => {}
        other => panic!("unexpected result: {other:?}"),
    }
}

#[tokio::test]
async fn test_open_after_close_is_rejected() {
    let connector = MockConnector::new();
    let (mut conn, mut server) = ready(&connector).await;

    conn.close();
    assert!(server.is_closed().await);

    // A second pipe is queued so a reconnect attempt would succeed.
    let _spare = connector.accept();
    match conn.open().await {
        Err(Error::InvalidState(_)) => {}
        other => panic!("unexpected result: {other:?}"),
    }
    assert_eq!(conn.state(), ConnectionState::Closed);
}

#[tokio::test]
async fn test_open_after_failed_open_is_rejected() {
    let connector = MockConnector::new();
    let mut server = connector.accept();
    let mut conn = connection(&connector, settings());

    let (result, ()) = tokio::join!(conn.open(), server.send("* BYE too many connections"));
    assert!(matches!(result, Err(Error::Bye(_))));

    let _spare = connector.accept();
    match conn.open().await {
        Err(Error::InvalidState(_)) => {}
        other => panic!("unexpected result: {other:?}"),
    }
    assert_eq!(conn.state(), ConnectionState::Closed);
}

#[tokio::test]
async fn test_logout_closes() {
    let connector = MockConnector::new();
    let mut server = connector.accept();
    let mut conn = connection(&connector, settings());

    let (result, ()) = tokio::join!(conn.open(), server.serve_login("IMAP4rev1"));
    result.unwrap();

    let script = async {
        let tag = server.expect("LOGOUT").await;
        server.send("* BYE logging out").await;
        server.send(&format!("{tag} OK LOGOUT completed")).await;
        assert!(server.is_closed().await);
    };
    tokio::join!(conn.logout(), script);

    assert_eq!(conn.state(), ConnectionState::Closed);
    assert!(!conn.is_open());
}

// ── STARTTLS ───────────────────────────────────────────────────────

#[tokio::test]
async fn test_starttls_refreshes_capabilities() {
    let connector = MockConnector::new();
    let mut server = connector.accept();
    let mut conn = connection(
        &connector,
        ImapSettings::builder("imap.test")
            .security(Security::StartTls)
            .username("user")
            .password("secret")
            .build(),
    );

    let script = async {
        server
            .send("* OK [CAPABILITY IMAP4rev1 STARTTLS LOGINDISABLED] ready")
            .await;
        server.ok("STARTTLS").await;

        let tag = server.expect("CAPABILITY").await;
        server.send("* CAPABILITY IMAP4rev1 AUTH=PLAIN SASL-IR").await;
        server.send(&format!("{tag} OK CAPABILITY completed")).await;

        let tag = server
            .expect(&format!("AUTHENTICATE PLAIN {PLAIN_PAYLOAD}"))
            .await;
        server
            .send(&format!("{tag} OK [CAPABILITY IMAP4rev1 IDLE] Logged in"))
            .await;
        server.serve_delimiter("/").await;
    };
    let (result, ()) = tokio::join!(conn.open(), script);

    result.unwrap();
    assert_eq!(connector.tls_upgrades(), 1);
    assert!(!conn.has_capability("STARTTLS"));
    assert!(conn.has_capability("IDLE"));
}

#[tokio::test]
async fn test_starttls_not_offered() {
    let connector = MockConnector::new();
    let mut server = connector.accept();
    let mut conn = connection(
        &connector,
        ImapSettings::builder("imap.test")
            .security(Security::StartTls)
            .username("user")
            .password("secret")
            .build(),
    );

    let script = async {
        server.send("* OK [CAPABILITY IMAP4rev1 AUTH=PLAIN] ready").await;
        assert!(server.is_closed().await);
    };
    let (result, ()) = tokio::join!(conn.open(), script);

    match result {
        Err(Error::CertificateValidation(message)) => {
            assert_eq!(message, "STARTTLS connection security not available");
        }
        other => panic!("unexpected result: {other:?}"),
    }
    assert_eq!(connector.tls_upgrades(), 0);
}

// ── Authentication ─────────────────────────────────────────────────

#[tokio::test]
async fn test_cram_md5_not_advertised() {
    let connector = MockConnector::new();
    let mut server = connector.accept();
    let mut settings = settings();
    settings.auth_type = AuthType::CramMd5;
    let mut conn = connection(&connector, settings);

    let script = async {
        server.send("* OK [CAPABILITY IMAP4rev1 AUTH=PLAIN] ready").await;
        assert!(server.is_closed().await);
    };
    let (result, ()) = tokio::join!(conn.open(), script);

    match result {
        Err(Error::MissingCapability(name)) => assert_eq!(name, "AUTH=CRAM-MD5"),
        other => panic!("unexpected result: {other:?}"),
    }
    assert_eq!(conn.state(), ConnectionState::Closed);
}

#[tokio::test]
async fn test_plain_without_sasl_ir_waits_for_continuation() {
    let connector = MockConnector::new();
    let mut server = connector.accept();
    let mut conn = connection(&connector, settings());

    let script = async {
        server.send("* OK [CAPABILITY IMAP4rev1 AUTH=PLAIN] ready").await;
        let tag = server.expect("AUTHENTICATE PLAIN").await;
        server.send("+ ").await;
        server.expect_line(PLAIN_PAYLOAD).await;
        server
            .send(&format!("{tag} OK [CAPABILITY IMAP4rev1] Logged in"))
            .await;
        server.serve_delimiter("/").await;
    };
    let (result, ()) = tokio::join!(conn.open(), script);

    result.unwrap();
}

#[tokio::test]
async fn test_plain_rejected_falls_back_to_login() {
    let connector = MockConnector::new();
    let mut server = connector.accept();
    let mut conn = connection(&connector, settings());

    let script = async {
        server
            .send("* OK [CAPABILITY IMAP4rev1 AUTH=PLAIN SASL-IR] ready")
            .await;
        let tag = server
            .expect(&format!("AUTHENTICATE PLAIN {PLAIN_PAYLOAD}"))
            .await;
        server.send(&format!("{tag} NO PLAIN is broken here")).await;

        let tag = server.expect("LOGIN user secret").await;
        server
            .send(&format!("{tag} OK [CAPABILITY IMAP4rev1 IDLE] Logged in"))
            .await;
        server.serve_delimiter("/").await;
    };
    let (result, ()) = tokio::join!(conn.open(), script);

    result.unwrap();
    assert!(conn.has_capability("IDLE"));
}

#[tokio::test]
async fn test_login_disabled_reports_rejected_credentials() {
    let connector = MockConnector::new();
    let mut server = connector.accept();
    let mut conn = connection(&connector, settings());

    let script = async {
        server
            .send("* OK [CAPABILITY IMAP4rev1 AUTH=PLAIN SASL-IR LOGINDISABLED] ready")
            .await;
        let tag = server
            .expect(&format!("AUTHENTICATE PLAIN {PLAIN_PAYLOAD}"))
            .await;
        server
            .send(&format!("{tag} NO [AUTHENTICATIONFAILED] Invalid credentials"))
            .await;
        assert!(server.is_closed().await);
    };
    let (result, ()) = tokio::join!(conn.open(), script);

    match result {
        Err(Error::AuthenticationFailed {
            message,
            server_message,
        }) => {
            assert_eq!(message, "Invalid credentials");
            assert_eq!(server_message.as_deref(), Some("Invalid credentials"));
        }
        other => panic!("unexpected result: {other:?}"),
    }
    assert_eq!(conn.state(), ConnectionState::Closed);
}

#[tokio::test]
async fn test_xoauth2_retries_once_with_fresh_token() {
    // {"status":"400","schemes":"Bearer","scope":"https://mail.google.com/"}
    const CHALLENGE: &str = "eyJzdGF0dXMiOiI0MDAiLCJzY2hlbWVzIjoiQmVhcmVyIiwic2NvcGUiOiJodHRwczovL21haWwuZ29vZ2xlLmNvbS8ifQ==";

    let connector = MockConnector::new();
    let mut server = connector.accept();
    let provider = Arc::new(CountingTokenProvider::default());
    let mut settings = settings();
    settings.auth_type = AuthType::XOAuth2;
    settings.password = None;
    let mut conn = connection(&connector, settings).with_token_provider(provider.clone());

    let script = async {
        server
            .send("* OK [CAPABILITY IMAP4rev1 SASL-IR AUTH=XOAUTH2] ready")
            .await;
        for expected in ["token1", "token2"] {
            let (tag, payload) = server.expect_prefix("AUTHENTICATE XOAUTH2 ").await;
            let decoded = String::from_utf8(STANDARD.decode(payload).unwrap()).unwrap();
            assert_eq!(decoded, format!("user=user\x01auth=Bearer {expected}\x01\x01"));

            server.send(&format!("+ {CHALLENGE}")).await;
            server.expect_line("").await;
            server
                .send(&format!("{tag} NO [AUTHENTICATIONFAILED] Invalid credentials"))
                .await;
        }
        assert!(server.is_closed().await);
    };
    let (result, ()) = tokio::join!(conn.open(), script);

    match result {
        Err(Error::AuthenticationFailed { server_message, .. }) => {
            assert_eq!(server_message.as_deref(), Some("Invalid credentials"));
        }
        other => panic!("unexpected result: {other:?}"),
    }
    assert_eq!(provider.issued(), 2);
    assert_eq!(provider.invalidated(), 2);
}

#[tokio::test]
async fn test_oauthbearer_preferred() {
    let connector = MockConnector::new();
    let mut server = connector.accept();
    let provider = Arc::new(CountingTokenProvider::default());
    let mut settings = settings();
    settings.auth_type = AuthType::XOAuth2;
    let mut conn = connection(&connector, settings).with_token_provider(provider);

    let script = async {
        server
            .send("* OK [CAPABILITY IMAP4rev1 SASL-IR AUTH=XOAUTH2 AUTH=OAUTHBEARER] ready")
            .await;
        let (tag, payload) = server.expect_prefix("AUTHENTICATE OAUTHBEARER ").await;
        let decoded = String::from_utf8(STANDARD.decode(payload).unwrap()).unwrap();
        assert!(decoded.contains("auth=Bearer token1"));
        server
            .send(&format!("{tag} OK [CAPABILITY IMAP4rev1] Logged in"))
            .await;
        server.serve_delimiter("/").await;
    };
    let (result, ()) = tokio::join!(conn.open(), script);

    result.unwrap();
}

// ── Post-login negotiation ─────────────────────────────────────────

#[tokio::test]
async fn test_compression_id_and_namespace() {
    let connector = MockConnector::new();
    let server = connector.accept();
    let mut settings = settings();
    settings.use_compression = true;
    settings.client_info = Some(ClientInfo::new("mailpush", "1.0"));
    let mut conn = connection(&connector, settings);

    let script = async move {
        let mut server = server;
        server
            .send("* OK [CAPABILITY IMAP4rev1 AUTH=PLAIN SASL-IR] ready")
            .await;
        let tag = server
            .expect(&format!("AUTHENTICATE PLAIN {PLAIN_PAYLOAD}"))
            .await;
        server
            .send(&format!(
                "{tag} OK [CAPABILITY IMAP4rev1 COMPRESS=DEFLATE ID NAMESPACE IDLE] Logged in"
            ))
            .await;
        server.ok("COMPRESS DEFLATE").await;

        let mut server = server.start_deflate();
        let tag = server
            .expect("ID (\"name\" \"mailpush\" \"version\" \"1.0\")")
            .await;
        server.send("* ID (\"name\" \"test server\")").await;
        server.send(&format!("{tag} OK ID completed")).await;

        let tag = server.expect("NAMESPACE").await;
        server.send("* NAMESPACE ((\"INBOX.\" \".\")) NIL NIL").await;
        server.send(&format!("{tag} OK NAMESPACE completed")).await;
        server
    };
    let (result, mut server) = tokio::join!(conn.open(), script);

    result.unwrap();
    assert!(conn.is_compressed());
    assert_eq!(conn.path_prefix(), Some("INBOX."));
    assert_eq!(conn.path_delimiter(), Some("."));

    let script = async {
        let tag = server.expect("NOOP").await;
        server.send("* 3 EXISTS").await;
        server.send(&format!("{tag} OK NOOP completed")).await;
    };
    let (responses, ()) = tokio::join!(conn.noop(), script);

    let responses = responses.unwrap();
    assert_eq!(responses[0].numbered(keyword::EXISTS), Some(3));
}

#[tokio::test]
async fn test_compression_rejected_continues_uncompressed() {
    let connector = MockConnector::new();
    let mut server = connector.accept();
    let mut settings = settings();
    settings.use_compression = true;
    let mut conn = connection(&connector, settings);

    let script = async {
        server
            .send("* OK [CAPABILITY IMAP4rev1 AUTH=PLAIN SASL-IR] ready")
            .await;
        let tag = server
            .expect(&format!("AUTHENTICATE PLAIN {PLAIN_PAYLOAD}"))
            .await;
        server
            .send(&format!("{tag} OK [CAPABILITY IMAP4rev1 COMPRESS=DEFLATE] Logged in"))
            .await;
        let tag = server.expect("COMPRESS DEFLATE").await;
        server.send(&format!("{tag} NO not today")).await;
        server.serve_delimiter("/").await;
    };
    let (result, ()) = tokio::join!(conn.open(), script);

    result.unwrap();
    assert!(!conn.is_compressed());
    assert_eq!(conn.state(), ConnectionState::Ready);
}

#[tokio::test]
async fn test_configured_delimiter_skips_list() {
    let connector = MockConnector::new();
    let mut server = connector.accept();
    let mut settings = settings();
    settings.path_prefix = Some("INBOX.".to_string());
    settings.path_delimiter = Some(".".to_string());
    let mut conn = connection(&connector, settings);

    let script = async {
        server
            .send("* OK [CAPABILITY IMAP4rev1 AUTH=PLAIN SASL-IR] ready")
            .await;
        let tag = server
            .expect(&format!("AUTHENTICATE PLAIN {PLAIN_PAYLOAD}"))
            .await;
        server
            .send(&format!("{tag} OK [CAPABILITY IMAP4rev1 NAMESPACE] Logged in"))
            .await;
    };
    let (result, ()) = tokio::join!(conn.open(), script);

    result.unwrap();
    assert_eq!(conn.path_prefix(), Some("INBOX."));
    assert_eq!(conn.path_delimiter(), Some("."));
}

// ── Commands on a ready connection ─────────────────────────────────

async fn ready(connector: &Arc<MockConnector>) -> (Connection<MockConnector>, mock_server::ScriptedServer) {
    let mut server = connector.accept();
    let mut conn = connection(connector, settings());
    let (result, ()) = tokio::join!(conn.open(), server.serve_login("IMAP4rev1 IDLE"));
    result.unwrap();
    (conn, server)
}

#[tokio::test]
async fn test_stale_tag_keeps_only_mailbox_size_updates() {
    let connector = MockConnector::new();
    let (mut conn, mut server) = ready(&connector).await;

    let script = async {
        let tag = server.expect("NOOP").await;
        server.send("* FLAGS (\\Seen \\Answered)").await;
        server.send("* 4 EXISTS").await;
        server.send("A0 OK left over from an older command").await;
        server.send("* 2 RECENT").await;
        server.send(&format!("{tag} OK NOOP completed")).await;
    };
    let (responses, ()) = tokio::join!(conn.noop(), script);

    let responses = responses.unwrap();
    assert_eq!(responses.len(), 3);
    assert_eq!(responses[0].numbered(keyword::EXISTS), Some(4));
    assert_eq!(responses[1].numbered(keyword::RECENT), Some(2));
    assert!(responses[2].is_tagged());
}

#[tokio::test]
async fn test_negative_completion_keeps_connection_open() {
    let connector = MockConnector::new();
    let (mut conn, mut server) = ready(&connector).await;

    let script = async {
        let tag = server.expect("SELECT Missing").await;
        server
            .send(&format!("{tag} NO [NONEXISTENT] Unknown mailbox"))
            .await;
    };
    let (result, ()) = tokio::join!(conn.select("Missing", None), script);

    let err = result.unwrap_err();
    let negative = err.as_negative().unwrap();
    assert_eq!(negative.response_code(), Some("NONEXISTENT"));
    assert_eq!(negative.response_text(), Some("Unknown mailbox"));
    assert_eq!(conn.state(), ConnectionState::Ready);
}

#[tokio::test]
async fn test_select_and_uid_search() {
    let connector = MockConnector::new();
    let (mut conn, mut server) = ready(&connector).await;

    let script = async {
        let tag = server.expect("SELECT \"Sent Mail\"").await;
        server.send("* 12 EXISTS").await;
        server.send("* OK [UIDVALIDITY 3857529045] UIDs valid").await;
        server.send("* OK [UIDNEXT 4392] Predicted next UID").await;
        server
            .send(&format!("{tag} OK [READ-WRITE] SELECT completed"))
            .await;

        let tag = server.expect("UID SEARCH UNSEEN").await;
        server.send("* SEARCH 4380 4388 4391").await;
        server.send(&format!("{tag} OK SEARCH completed")).await;
    };
    let (result, ()) = tokio::join!(
        async {
            let selected = conn.select("Sent Mail", None).await?;
            let unseen = conn.uid_search("UNSEEN").await?;
            Ok::<_, Error>((selected, unseen))
        },
        script
    );

    let (selected, unseen) = result.unwrap();
    assert_eq!(selected.exists(), Some(12));
    assert_eq!(selected.uid_next(), Some(4392));
    assert_eq!(unseen, vec![4380, 4388, 4391]);
}

#[tokio::test]
async fn test_execute_split_runs_every_chunk() {
    let connector = MockConnector::new();
    let mut server = connector.accept();
    let mut settings = settings();
    settings.max_command_length = 23;
    let mut conn = connection(&connector, settings);

    let (result, ()) = tokio::join!(conn.open(), server.serve_login("IMAP4rev1"));
    result.unwrap();

    let command = SequenceCommand::new("UID FETCH", IdSelection::Set(IdSet::new([10, 20, 30, 40])))
        .with_suffix("(FLAGS)");
    let script = async {
        let tag = server.expect("UID FETCH 10,20 (FLAGS)").await;
        server.send("* 1 FETCH (UID 10 FLAGS (\\Seen))").await;
        server.send(&format!("{tag} OK FETCH completed")).await;
        let tag = server.expect("UID FETCH 30,40 (FLAGS)").await;
        server.send("* 3 FETCH (UID 30 FLAGS ())").await;
        server.send(&format!("{tag} OK FETCH completed")).await;
    };
    let (responses, ()) = tokio::join!(conn.execute_split(&command), script);

    let responses = responses.unwrap();
    assert_eq!(responses.len(), 4);
    assert_eq!(responses[0].numbered(keyword::FETCH), Some(1));
    assert_eq!(responses[2].numbered(keyword::FETCH), Some(3));
}

#[tokio::test]
async fn test_idle_round_trip() {
    let connector = MockConnector::new();
    let (mut conn, mut server) = ready(&connector).await;

    let script = async {
        let tag = server.expect("IDLE").await;
        server.send("* 1 RECENT").await;
        server.send("+ idling").await;
        tag
    };
    let (early, tag) = tokio::join!(conn.idle(), script);

    let early = early.unwrap();
    assert_eq!(early.len(), 1);
    assert!(conn.is_idling());
    assert!(matches!(conn.idle().await, Err(Error::InvalidState(_))));

    server.send("* 7 EXISTS").await;
    conn.wait_for_data().await.unwrap();
    let update = conn.read_response(None).await.unwrap();
    assert_eq!(update.numbered(keyword::EXISTS), Some(7));

    let script = async {
        server.expect_line("DONE").await;
        server.send("* 6 EXPUNGE").await;
        server.send(&format!("{tag} OK IDLE terminated")).await;
    };
    let (done, ()) = tokio::join!(conn.done(), script);

    let done = done.unwrap();
    assert_eq!(done[0].numbered(keyword::EXPUNGE), Some(6));
    assert!(!conn.is_idling());
}

#[tokio::test]
async fn test_idle_refused() {
    let connector = MockConnector::new();
    let (mut conn, mut server) = ready(&connector).await;

    let script = async {
        let tag = server.expect("IDLE").await;
        server.send(&format!("{tag} BAD IDLE not allowed now")).await;
    };
    let (result, ()) = tokio::join!(conn.idle(), script);

    assert!(result.unwrap_err().as_negative().is_some());
    assert!(!conn.is_idling());
}

#[tokio::test(start_paused = true)]
async fn test_read_timeout_closes_connection() {
    let connector = MockConnector::new();
    let mut server = connector.accept();
    let mut settings = settings();
    settings.read_timeout = Duration::from_secs(1);
    let mut conn = connection(&connector, settings);

    let (result, ()) = tokio::join!(conn.open(), server.serve_login("IMAP4rev1"));
    result.unwrap();

    let script = async {
        server.expect("NOOP").await;
        assert!(server.is_closed().await);
    };
    let (result, ()) = tokio::join!(conn.noop(), script);

    assert!(matches!(result, Err(Error::Timeout(_))));
    assert_eq!(conn.state(), ConnectionState::Closed);
}

#[tokio::test]
async fn test_server_disconnect_closes_connection() {
    let connector = MockConnector::new();
    let (mut conn, server) = ready(&connector).await;
    drop(server);

    let err = conn.noop().await.unwrap_err();

    assert!(err.is_transport());
    assert_eq!(conn.state(), ConnectionState::Closed);
}

#[tokio::test]
async fn test_oversized_literal_closes_connection() {
    let connector = MockConnector::new();
    let (mut conn, mut server) = ready(&connector).await;

    let script = async {
        server.expect("NOOP").await;
        // Written in one go so the client cannot drop the pipe in between.
        server.send("* 1 FETCH (BODY[] {200000000}\r\n* 99 EXISTS").await;
    };
    let (result, ()) = tokio::join!(conn.noop(), script);

    match result {
        Err(Error::Protocol(message)) => assert!(message.starts_with("literal too large")),
        other => panic!("unexpected result: {other:?}"),
    }
    assert_eq!(conn.state(), ConnectionState::Closed);
    assert!(!conn.is_open());
    assert!(matches!(conn.read_response(None).await, Err(Error::InvalidState(_))));
    assert!(server.is_closed().await);
}
