use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// An access credential presented to the backend.
///
/// The realtime connection authenticates once at open time, so the expiry is
/// checked before every connection attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub access_token: String,
    /// `None` means the credential never expires.
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

impl Credential {
    pub fn new(access_token: impl Into<String>, expires_at: Option<DateTime<Utc>>) -> Self {
        Self {
            access_token: access_token.into(),
            expires_at,
        }
    }

    /// Credential used when the backend runs without authentication.
    pub fn anonymous() -> Self {
        Self {
            access_token: String::new(),
            expires_at: None,
        }
    }

    pub fn is_anonymous(&self) -> bool {
        self.access_token.is_empty()
    }

    /// Whether the credential expires within `margin` of `now`.
    pub fn expires_within(&self, margin: Duration, now: DateTime<Utc>) -> bool {
        match self.expires_at {
            Some(expires_at) => expires_at - now <= margin,
            None => false,
        }
    }
}
