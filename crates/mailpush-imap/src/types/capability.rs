//! Server capabilities.

use std::collections::HashSet;
use std::fmt;

/// Capability names the engine acts on, uppercase as stored.
pub mod names {
    /// `IMAP4rev1` (RFC 3501)
    pub const IMAP4REV1: &str = "IMAP4REV1";
    /// IDLE command (RFC 2177)
    pub const IDLE: &str = "IDLE";
    /// NAMESPACE command (RFC 2342)
    pub const NAMESPACE: &str = "NAMESPACE";
    /// UIDPLUS extension (RFC 4315)
    pub const UIDPLUS: &str = "UIDPLUS";
    /// MOVE extension (RFC 6851)
    pub const MOVE: &str = "MOVE";
    /// ID command (RFC 2971)
    pub const ID: &str = "ID";
    /// ENABLE command (RFC 5161)
    pub const ENABLE: &str = "ENABLE";
    /// CONDSTORE extension (RFC 7162)
    pub const CONDSTORE: &str = "CONDSTORE";
    /// QRESYNC extension (RFC 7162)
    pub const QRESYNC: &str = "QRESYNC";
    /// STARTTLS command
    pub const STARTTLS: &str = "STARTTLS";
    /// LOGIN command is disabled
    pub const LOGINDISABLED: &str = "LOGINDISABLED";
    /// SASL initial response (RFC 4959)
    pub const SASL_IR: &str = "SASL-IR";
    /// COMPRESS=DEFLATE (RFC 4978)
    pub const COMPRESS_DEFLATE: &str = "COMPRESS=DEFLATE";
    /// SASL PLAIN
    pub const AUTH_PLAIN: &str = "AUTH=PLAIN";
    /// SASL CRAM-MD5
    pub const AUTH_CRAM_MD5: &str = "AUTH=CRAM-MD5";
    /// SASL EXTERNAL
    pub const AUTH_EXTERNAL: &str = "AUTH=EXTERNAL";
    /// Google/Microsoft XOAUTH2
    pub const AUTH_XOAUTH2: &str = "AUTH=XOAUTH2";
    /// Legacy name of XOAUTH2
    pub const AUTH_XOAUTH: &str = "AUTH=XOAUTH";
    /// SASL OAUTHBEARER (RFC 7628)
    pub const AUTH_OAUTHBEARER: &str = "AUTH=OAUTHBEARER";
}

/// Immutable snapshot of the capabilities a server advertised.
///
/// Names are stored uppercase. A fresh CAPABILITY response replaces the whole
/// set; sets are never merged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Capabilities {
    names: HashSet<String>,
}

impl Capabilities {
    /// Creates a capability set, uppercasing every name.
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            names: names
                .into_iter()
                .map(|name| name.as_ref().to_ascii_uppercase())
                .collect(),
        }
    }

    /// Returns true if `name` is advertised. Matching ignores case.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(&name.to_ascii_uppercase())
    }

    /// Number of capabilities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Returns true if nothing is advertised.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Iterates over the uppercase names in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    /// IDLE is available.
    #[must_use]
    pub fn is_idle_capable(&self) -> bool {
        self.contains(names::IDLE)
    }

    /// UIDPLUS is available.
    #[must_use]
    pub fn has_uidplus(&self) -> bool {
        self.contains(names::UIDPLUS)
    }

    /// CONDSTORE is available.
    #[must_use]
    pub fn has_condstore(&self) -> bool {
        self.contains(names::CONDSTORE)
    }

    /// QRESYNC is available.
    #[must_use]
    pub fn has_qresync(&self) -> bool {
        self.contains(names::QRESYNC)
    }

    /// NAMESPACE is available.
    #[must_use]
    pub fn has_namespace(&self) -> bool {
        self.contains(names::NAMESPACE)
    }

    /// MOVE is available.
    #[must_use]
    pub fn has_move(&self) -> bool {
        self.contains(names::MOVE)
    }
}

impl fmt::Display for Capabilities {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&str> = self.iter().collect();
        names.sort_unstable();
        f.write_str(&names.join(" "))
    }
}
