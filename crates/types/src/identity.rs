// crates/types/src/identity.rs
//! Signed-in identity and per-provider authorization handles.

use serde::{Deserialize, Serialize};

/// The authenticated user, as persisted across restarts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub user_id: String,
    pub name: String,
    pub email: String,
}

/// A migration endpoint provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Outlook,
    Gmail,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Outlook => "outlook",
            Provider::Gmail => "gmail",
        }
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Provider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "outlook" => Ok(Provider::Outlook),
            "gmail" => Ok(Provider::Gmail),
            other => Err(format!("unknown provider: {other}")),
        }
    }
}

/// An authorization handle for one provider. Always carries an access
/// credential; refresh material is optional and opaque to the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderToken {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// The two named authorization slots, each absent until the provider's
/// out-of-band consent flow completes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderTokens {
    #[serde(default)]
    pub outlook: Option<ProviderToken>,
    #[serde(default)]
    pub gmail: Option<ProviderToken>,
}

impl ProviderTokens {
    pub fn get(&self, provider: Provider) -> Option<&ProviderToken> {
        match provider {
            Provider::Outlook => self.outlook.as_ref(),
            Provider::Gmail => self.gmail.as_ref(),
        }
    }

    pub fn clear(&mut self, provider: Provider) {
        match provider {
            Provider::Outlook => self.outlook = None,
            Provider::Gmail => self.gmail = None,
        }
    }

    /// Both slots populated, i.e. a migration can be started.
    pub fn complete(&self) -> bool {
        self.outlook.is_some() && self.gmail.is_some()
    }
}
