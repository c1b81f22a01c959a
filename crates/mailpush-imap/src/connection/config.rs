//! Connection configuration types.

use std::fmt;
use std::time::Duration;

use crate::command::DEFAULT_MAX_COMMAND_LENGTH;

/// Connection security mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Security {
    /// No encryption (port 143). **Not recommended for production.**
    None,
    /// Start with plaintext, upgrade with STARTTLS (port 143).
    StartTls,
    /// TLS from the start (port 993). **Recommended.**
    #[default]
    Implicit,
}

impl Security {
    /// Returns the default port for this security mode.
    #[must_use]
    pub const fn default_port(self) -> u16 {
        match self {
            Self::None | Self::StartTls => 143,
            Self::Implicit => 993,
        }
    }
}

/// How the connection authenticates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthType {
    /// `AUTHENTICATE PLAIN`, falling back to `LOGIN`.
    #[default]
    Plain,
    /// `AUTHENTICATE CRAM-MD5`.
    CramMd5,
    /// `AUTHENTICATE OAUTHBEARER` or `XOAUTH2` with a bearer token.
    XOAuth2,
    /// `AUTHENTICATE EXTERNAL` (TLS client certificate).
    External,
}

/// Application identity sent with the ID command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientInfo {
    /// Application name.
    pub app_name: String,
    /// Application version.
    pub app_version: String,
}

impl ClientInfo {
    /// Creates client information.
    #[must_use]
    pub fn new(app_name: impl Into<String>, app_version: impl Into<String>) -> Self {
        Self {
            app_name: app_name.into(),
            app_version: app_version.into(),
        }
    }
}

/// IMAP account settings used to open connections.
#[derive(Clone)]
pub struct ImapSettings {
    /// Server hostname.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// Security mode.
    pub security: Security,
    /// Authentication mechanism.
    pub auth_type: AuthType,
    /// Login name.
    pub username: String,
    /// Password; unused for XOAUTH2 and EXTERNAL.
    pub password: Option<String>,
    /// Negotiate COMPRESS=DEFLATE when offered.
    pub use_compression: bool,
    /// Personal namespace prefix; discovered through NAMESPACE when `None`.
    pub path_prefix: Option<String>,
    /// Hierarchy delimiter; discovered through LIST when `None`.
    pub path_delimiter: Option<String>,
    /// Identity for the ID command.
    pub client_info: Option<ClientInfo>,
    /// Connection timeout.
    pub connect_timeout: Duration,
    /// Read timeout for command responses.
    pub read_timeout: Duration,
    /// Line-length budget for split commands, excluding the tag.
    pub max_command_length: usize,
}

impl ImapSettings {
    /// Creates settings with implicit TLS on port 993 and PLAIN authentication.
    #[must_use]
    pub fn new(host: impl Into<String>, username: impl Into<String>) -> Self {
        ImapSettingsBuilder::new(host).username(username).build()
    }

    /// Creates a settings builder.
    #[must_use]
    pub fn builder(host: impl Into<String>) -> ImapSettingsBuilder {
        ImapSettingsBuilder::new(host)
    }
}

impl fmt::Debug for ImapSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImapSettings")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("security", &self.security)
            .field("auth_type", &self.auth_type)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "[sensitive]"))
            .field("use_compression", &self.use_compression)
            .field("path_prefix", &self.path_prefix)
            .field("path_delimiter", &self.path_delimiter)
            .field("client_info", &self.client_info)
            .field("connect_timeout", &self.connect_timeout)
            .field("read_timeout", &self.read_timeout)
            .field("max_command_length", &self.max_command_length)
            .finish()
    }
}

/// Builder for [`ImapSettings`].
#[derive(Debug, Clone)]
pub struct ImapSettingsBuilder {
    settings: ImapSettings,
    port: Option<u16>,
}

impl ImapSettingsBuilder {
    /// Creates a new builder with the given hostname.
    #[must_use]
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            settings: ImapSettings {
                host: host.into(),
                port: Security::Implicit.default_port(),
                security: Security::Implicit,
                auth_type: AuthType::Plain,
                username: String::new(),
                password: None,
                use_compression: false,
                path_prefix: None,
                path_delimiter: None,
                client_info: None,
                connect_timeout: Duration::from_secs(30),
                read_timeout: Duration::from_secs(60),
                max_command_length: DEFAULT_MAX_COMMAND_LENGTH,
            },
            port: None,
        }
    }

    /// Sets the port.
    #[must_use]
    pub const fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Sets the security mode.
    #[must_use]
    pub const fn security(mut self, security: Security) -> Self {
        self.settings.security = security;
        self
    }

    /// Sets the authentication mechanism.
    #[must_use]
    pub const fn auth_type(mut self, auth_type: AuthType) -> Self {
        self.settings.auth_type = auth_type;
        self
    }

    /// Sets the login name.
    #[must_use]
    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.settings.username = username.into();
        self
    }

    /// Sets the password.
    #[must_use]
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.settings.password = Some(password.into());
        self
    }

    /// Enables COMPRESS=DEFLATE negotiation.
    #[must_use]
    pub const fn use_compression(mut self, enabled: bool) -> Self {
        self.settings.use_compression = enabled;
        self
    }

    /// Sets a known namespace prefix, skipping NAMESPACE discovery.
    #[must_use]
    pub fn path_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.settings.path_prefix = Some(prefix.into());
        self
    }

    /// Sets a known hierarchy delimiter, skipping LIST discovery.
    #[must_use]
    pub fn path_delimiter(mut self, delimiter: impl Into<String>) -> Self {
        self.settings.path_delimiter = Some(delimiter.into());
        self
    }

    /// Sets the identity sent with the ID command.
    #[must_use]
    pub fn client_info(mut self, info: ClientInfo) -> Self {
        self.settings.client_info = Some(info);
        self
    }

    /// Sets the connection timeout.
    #[must_use]
    pub const fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.settings.connect_timeout = timeout;
        self
    }

    /// Sets the read timeout.
    #[must_use]
    pub const fn read_timeout(mut self, timeout: Duration) -> Self {
        self.settings.read_timeout = timeout;
        self
    }

    /// Sets the line-length budget for split commands.
    #[must_use]
    pub const fn max_command_length(mut self, length: usize) -> Self {
        self.settings.max_command_length = length;
        self
    }

    /// Builds the settings.
    #[must_use]
    pub fn build(self) -> ImapSettings {
        let mut settings = self.settings;
        settings.port = self
            .port
            .unwrap_or_else(|| settings.security.default_port());
        settings
    }
}

/// Tuning of the push engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushConfig {
    /// How long to stay in IDLE before re-issuing it.
    pub refresh_interval: Duration,
    /// Consecutive failures after which a folder pusher gives up.
    pub max_failures: u32,
    /// How many of the newest messages to catch up on after a long absence.
    pub display_count: u64,
    /// First delay after a failure.
    pub initial_backoff: Duration,
    /// Upper bound for the doubling delay.
    pub max_backoff: Duration,
    /// Time `stop()` waits for a pusher before aborting it.
    pub stop_grace: Duration,
}

impl PushConfig {
    /// Sets the refresh interval in minutes.
    #[must_use]
    pub const fn with_refresh_minutes(mut self, minutes: u64) -> Self {
        self.refresh_interval = Duration::from_secs(minutes * 60);
        self
    }

    /// Sets the catch-up window.
    #[must_use]
    pub const fn with_display_count(mut self, count: u64) -> Self {
        self.display_count = count;
        self
    }
}

impl Default for PushConfig {
    fn default() -> Self {
        Self {
            refresh_interval: Duration::from_secs(24 * 60),
            max_failures: 10,
            display_count: 25,
            initial_backoff: Duration::from_secs(5),
            max_backoff: Duration::from_secs(5 * 60),
            stop_grace: Duration::from_secs(5),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_default_ports() {
        assert_eq!(Security::None.default_port(), 143);
        assert_eq!(Security::StartTls.default_port(), 143);
        assert_eq!(Security::Implicit.default_port(), 993);
    }

    #[test]
    fn test_settings_new() {
        let settings = ImapSettings::new("imap.example.com", "user");
        assert_eq!(settings.host, "imap.example.com");
        assert_eq!(settings.port, 993);
        assert_eq!(settings.security, Security::Implicit);
        assert_eq!(settings.auth_type, AuthType::Plain);
        assert_eq!(settings.max_command_length, 980);
        assert_eq!(settings.connect_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_builder() {
        let settings = ImapSettings::builder("imap.example.com")
            .security(Security::StartTls)
            .auth_type(AuthType::CramMd5)
            .username("user")
            .password("secret")
            .use_compression(true)
            .client_info(ClientInfo::new("mailpush", "1.0"))
            .read_timeout(Duration::from_secs(10))
            .build();

        assert_eq!(settings.port, 143);
        assert_eq!(settings.auth_type, AuthType::CramMd5);
        assert_eq!(settings.password.as_deref(), Some("secret"));
        assert!(settings.use_compression);
        assert_eq!(settings.read_timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_explicit_port_wins() {
        let settings = ImapSettings::builder("h")
            .security(Security::None)
            .port(1143)
            .build();
        assert_eq!(settings.port, 1143);
    }

    #[test]
    fn test_debug_masks_password() {
        let settings = ImapSettings::builder("h").password("hunter2").build();
        let debug = format!("{settings:?}");
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("[sensitive]"));
    }

    #[test]
    fn test_push_config_defaults() {
        let config = PushConfig::default().with_refresh_minutes(10);
        assert_eq!(config.refresh_interval, Duration::from_secs(600));
        assert_eq!(config.max_failures, 10);
        assert_eq!(config.initial_backoff, Duration::from_secs(5));
    }
}
