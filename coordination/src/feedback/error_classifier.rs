//! Provider failure classification
//!
//! Maps a raw attempt outcome (exit/HTTP status plus captured diagnostic text)
//! to exactly one [`ErrorKind`]. Signatures are checked in order and the first
//! match wins. Rate-limit signatures come first because throttled responses
//! frequently also look like generic server errors.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::LazyLock;

static RATE_LIMIT_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(rate[ _-]?limit|too many requests|\b429\b|quota (exceeded|exhausted)|resource[ _]exhausted|usage limit|retry[ -]after|x-ratelimit)",
    )
    .unwrap()
});

static AUTH_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(unauthori[sz]ed|authentication|invalid[ _]api[ _]key|api key (is )?(missing|invalid|not)|permission denied|forbidden|\b40[13]\b|not logged in|please (log ?in|login)|login required|(expired|invalid) token|subscription not active)",
    )
    .unwrap()
});

static TIMEOUT_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(timed? ?out|deadline exceeded|\b408\b|\b504\b|gateway timeout)").unwrap()
});

static NETWORK_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(connection (refused|reset|closed|aborted)|network (error|is unreachable|unreachable)|\bdns\b|could not resolve|name resolution|econnrefused|econnreset|broken pipe|tls handshake|socket hang up|host unreachable|error sending request)",
    )
    .unwrap()
});

static SERVER_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(internal server error|bad gateway|service unavailable|overloaded|\b50[0-3]\b|\b529\b|server error|upstream error)",
    )
    .unwrap()
});

/// Classified failure kind. Exhaustive and mutually exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Connectivity failure before a response was produced
    Network,
    /// Provider-side 5xx / overload
    Server,
    /// Attempt exceeded its time budget
    Timeout,
    /// Credentials rejected or missing
    Authentication,
    /// Provider is throttling requests
    RateLimit,
    /// Nothing recognised; never assumed transient
    Unknown,
}

impl ErrorKind {
    pub fn all() -> &'static [ErrorKind] {
        &[
            ErrorKind::Network,
            ErrorKind::Server,
            ErrorKind::Timeout,
            ErrorKind::Authentication,
            ErrorKind::RateLimit,
            ErrorKind::Unknown,
        ]
    }

    /// Whether this failure counts against the provider's circuit breaker.
    ///
    /// A throttled provider is temporarily inadmissible, not broken.
    pub fn counts_as_circuit_failure(&self) -> bool {
        !matches!(self, Self::RateLimit)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Network => write!(f, "network"),
            Self::Server => write!(f, "server"),
            Self::Timeout => write!(f, "timeout"),
            Self::Authentication => write!(f, "authentication"),
            Self::RateLimit => write!(f, "rate_limit"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// Raw outcome of a failed attempt as seen by the classifier.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawOutcome {
    /// Process exit code or HTTP status; `None` when no response was produced
    pub status: Option<i32>,
    /// Captured stderr / error body
    pub diagnostic: String,
    /// The harness timeout fired before the adapter returned
    pub timed_out: bool,
}

impl RawOutcome {
    pub fn new(status: Option<i32>, diagnostic: impl Into<String>) -> Self {
        Self {
            status,
            diagnostic: diagnostic.into(),
            timed_out: false,
        }
    }

    pub fn timed_out(diagnostic: impl Into<String>) -> Self {
        Self {
            status: None,
            diagnostic: diagnostic.into(),
            timed_out: true,
        }
    }
}

/// One classification rule: matches on a status code or on the diagnostic text.
#[derive(Debug, Clone)]
pub struct Signature {
    pub name: String,
    pub kind: ErrorKind,
    pub statuses: Vec<i32>,
    pub pattern: Option<Regex>,
}

impl Signature {
    pub fn new(name: impl Into<String>, kind: ErrorKind) -> Self {
        Self {
            name: name.into(),
            kind,
            statuses: Vec::new(),
            pattern: None,
        }
    }

    pub fn with_statuses(mut self, statuses: &[i32]) -> Self {
        self.statuses = statuses.to_vec();
        self
    }

    pub fn with_pattern(mut self, pattern: Regex) -> Self {
        self.pattern = Some(pattern);
        self
    }

    fn matches(&self, outcome: &RawOutcome) -> bool {
        if let Some(status) = outcome.status {
            if self.statuses.contains(&status) {
                return true;
            }
        }
        self.pattern
            .as_ref()
            .is_some_and(|p| p.is_match(&outcome.diagnostic))
    }
}

/// Ordered signature table.
#[derive(Debug, Clone)]
pub struct ErrorClassifier {
    signatures: Vec<Signature>,
}

impl ErrorClassifier {
    /// Classifier with the builtin signature table.
    pub fn new() -> Self {
        let signatures = vec![
            Signature::new("rate_limit", ErrorKind::RateLimit)
                .with_statuses(&[429])
                .with_pattern(RATE_LIMIT_PATTERN.clone()),
            Signature::new("authentication", ErrorKind::Authentication)
                .with_statuses(&[401, 403])
                .with_pattern(AUTH_PATTERN.clone()),
            // 124 is the exit status of coreutils `timeout`
            Signature::new("timeout", ErrorKind::Timeout)
                .with_statuses(&[124, 408, 504])
                .with_pattern(TIMEOUT_PATTERN.clone()),
            Signature::new("network", ErrorKind::Network).with_pattern(NETWORK_PATTERN.clone()),
            Signature::new("server", ErrorKind::Server)
                .with_statuses(&[500, 502, 503, 529])
                .with_pattern(SERVER_PATTERN.clone()),
        ];
        Self { signatures }
    }

    /// Put a signature ahead of the builtin ones.
    pub fn with_signature(mut self, signature: Signature) -> Self {
        self.signatures.insert(0, signature);
        self
    }

    /// Classify a failed outcome.
    pub fn classify(&self, outcome: &RawOutcome) -> ErrorKind {
        self.matching_signature(outcome)
            .map(|s| s.kind)
            .unwrap_or(ErrorKind::Unknown)
    }

    /// The signature that decided the classification, if any.
    pub fn matching_signature(&self, outcome: &RawOutcome) -> Option<&Signature> {
        if outcome.timed_out {
            return self.signatures.iter().find(|s| s.kind == ErrorKind::Timeout);
        }
        self.signatures.iter().find(|s| s.matches(outcome))
    }
}

impl Default for ErrorClassifier {
    fn default() -> Self {
        Self::new()
    }
}
