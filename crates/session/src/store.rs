// crates/session/src/store.rs
//! The session store proper. Owns the signed-in identity and the two
//! provider authorization slots; every other component depends only on
//! "is there an identity, and is there a credential to connect with".

use std::sync::RwLock;

use tracing::{error, info, warn};

use mailshift_api::AuthClient;
use mailshift_notify::Notifier;
use mailshift_types::{Identity, Provider, ProviderTokens};

use crate::error::SessionError;
use crate::persist::{PersistedSession, SessionFile};
use crate::validate;

/// The live session: who is signed in, with which credential.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub identity: Identity,
    pub token: String,
}

#[derive(Debug, Default)]
struct State {
    session: Option<Session>,
    tokens: ProviderTokens,
}

pub struct SessionStore {
    auth: AuthClient,
    notifier: Notifier,
    file: SessionFile,
    inner: RwLock<State>,
}

impl SessionStore {
    /// Store backed by the default config-dir session file.
    pub fn new(auth: AuthClient, notifier: Notifier) -> Result<Self, SessionError> {
        let path = SessionFile::default_path().ok_or_else(|| SessionError::Persist {
            path: "<config dir>".into(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "no user config directory"),
        })?;
        Ok(Self::with_file(auth, notifier, SessionFile::at(path)))
    }

    pub fn with_file(auth: AuthClient, notifier: Notifier, file: SessionFile) -> Self {
        Self {
            auth,
            notifier,
            file,
            inner: RwLock::new(State::default()),
        }
    }

    pub fn session(&self) -> Option<Session> {
        match self.inner.read() {
            Ok(state) => state.session.clone(),
            Err(e) => {
                error!("RwLock poisoned reading session: {e}");
                None
            }
        }
    }

    pub fn identity(&self) -> Option<Identity> {
        self.session().map(|s| s.identity)
    }

    pub fn token(&self) -> Option<String> {
        self.session().map(|s| s.token)
    }

    pub fn provider_tokens(&self) -> ProviderTokens {
        match self.inner.read() {
            Ok(state) => state.tokens.clone(),
            Err(e) => {
                error!("RwLock poisoned reading tokens: {e}");
                ProviderTokens::default()
            }
        }
    }

    /// Sign in with email + password. Input is validated locally
    /// first; a validation failure makes no remote call.
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<(), SessionError> {
        if !validate::valid_email(email) {
            return Err(SessionError::Validation("Enter a valid email address".into()));
        }
        if !validate::valid_password(password) {
            return Err(SessionError::Validation(format!(
                "Password must be at least {} characters",
                validate::MIN_PASSWORD_LEN
            )));
        }

        let response = match self.auth.login(email, password).await {
            Ok(response) => response,
            Err(e) => {
                self.notifier.error(format!("Login failed: {e}"));
                return Err(e.into());
            }
        };

        match (response.success, response.token, response.user_id) {
            (true, Some(token), Some(user_id)) => {
                let name = response
                    .name
                    .unwrap_or_else(|| email_prefix(email).to_string());
                self.install(
                    Session {
                        identity: Identity {
                            user_id,
                            name,
                            email: email.to_string(),
                        },
                        token,
                    },
                    true,
                )?;
                self.notifier.success("Successfully signed in!");
                Ok(())
            }
            _ => {
                let message = response
                    .message
                    .unwrap_or_else(|| "Login failed".to_string());
                self.notifier.error(message.clone());
                Err(SessionError::Rejected(message))
            }
        }
    }

    pub async fn sign_up(
        &self,
        name: &str,
        email: &str,
        password: &str,
    ) -> Result<(), SessionError> {
        if name.trim().is_empty() {
            return Err(SessionError::Validation("Name is required".into()));
        }
        if !validate::valid_email(email) {
            return Err(SessionError::Validation("Enter a valid email address".into()));
        }
        if !validate::valid_password(password) {
            return Err(SessionError::Validation(format!(
                "Password must be at least {} characters",
                validate::MIN_PASSWORD_LEN
            )));
        }

        let response = match self.auth.signup(name, email, password).await {
            Ok(response) => response,
            Err(e) => {
                self.notifier.error(format!("Signup failed: {e}"));
                return Err(e.into());
            }
        };

        match (response.success, response.token, response.user_id) {
            (true, Some(token), Some(user_id)) => {
                self.install(
                    Session {
                        identity: Identity {
                            user_id,
                            name: name.to_string(),
                            email: email.to_string(),
                        },
                        token,
                    },
                    true,
                )?;
                self.notifier.success("Account created successfully!");
                Ok(())
            }
            _ => {
                let message = response
                    .message
                    .unwrap_or_else(|| "Signup failed".to_string());
                self.notifier.error(message.clone());
                Err(SessionError::Rejected(message))
            }
        }
    }

    /// Re-hydrate from the persisted session at startup.
    ///
    /// The token is validated remotely: an invalid verdict clears the
    /// stored session, while a network failure keeps it (the stored
    /// identity is better than nothing when the backend is briefly
    /// unreachable).
    pub async fn restore(&self) -> Option<Identity> {
        let persisted = self.file.load()?;
        match self.auth.validate_token(&persisted.token).await {
            Ok(validation) if validation.valid => {
                let name = validation.name.unwrap_or(persisted.name);
                let email = validation.email.unwrap_or(persisted.email);
                let session = Session {
                    identity: Identity {
                        user_id: persisted.user_id,
                        name,
                        email,
                    },
                    token: persisted.token,
                };
                let identity = session.identity.clone();
                // Persist again so a server-side name correction sticks.
                if let Err(e) = self.install(session, true) {
                    warn!(error = %e, "failed to re-persist restored session");
                }
                self.notifier.success("Welcome back!");
                Some(identity)
            }
            Ok(_) => {
                info!("stored token no longer valid, clearing session");
                let _ = self.file.clear();
                None
            }
            Err(e) => {
                warn!(error = %e, "token validation unreachable, using stored session");
                let session = Session {
                    identity: Identity {
                        user_id: persisted.user_id,
                        name: persisted.name,
                        email: persisted.email,
                    },
                    token: persisted.token,
                };
                let identity = session.identity.clone();
                if let Err(e) = self.install(session, false) {
                    warn!(error = %e, "failed to install restored session");
                }
                Some(identity)
            }
        }
    }

    /// Clear the session everywhere: memory, persisted copy, slots.
    pub fn sign_out(&self) {
        match self.inner.write() {
            Ok(mut state) => {
                state.session = None;
                state.tokens = ProviderTokens::default();
            }
            Err(e) => error!("RwLock poisoned clearing session: {e}"),
        }
        if let Err(e) = self.file.clear() {
            warn!(error = %e, "failed to erase persisted session");
        }
        self.notifier.success("Successfully signed out");
    }

    /// Consent page URL for a provider's out-of-band authorization
    /// flow; the slot fills on the next `refresh_authorizations`.
    pub fn authorize_url(&self, provider: Provider) -> Result<String, SessionError> {
        let session = self.session().ok_or(SessionError::NotSignedIn)?;
        Ok(self
            .auth
            .authorize_url(&session.identity.user_id, provider))
    }

    pub async fn revoke_authorization(&self, provider: Provider) -> Result<(), SessionError> {
        let session = self.session().ok_or(SessionError::NotSignedIn)?;
        match self
            .auth
            .disconnect_provider(&session.token, &session.identity.user_id, provider)
            .await
        {
            Ok(_) => {
                match self.inner.write() {
                    Ok(mut state) => state.tokens.clear(provider),
                    Err(e) => error!("RwLock poisoned clearing provider token: {e}"),
                }
                self.notifier
                    .success(format!("{provider} disconnected successfully"));
                Ok(())
            }
            Err(e) => {
                self.notifier
                    .error(format!("Failed to disconnect {provider}"));
                Err(e.into())
            }
        }
    }

    /// Pull both provider slots from the auth surface.
    pub async fn refresh_authorizations(&self) -> Result<ProviderTokens, SessionError> {
        let session = self.session().ok_or(SessionError::NotSignedIn)?;
        let tokens = self
            .auth
            .user_tokens(&session.token, &session.identity.user_id)
            .await?;
        match self.inner.write() {
            Ok(mut state) => state.tokens = tokens.clone(),
            Err(e) => error!("RwLock poisoned storing provider tokens: {e}"),
        }
        Ok(tokens)
    }

    /// Rename the signed-in user; the change is persisted.
    pub fn update_profile(&self, name: &str) -> Result<(), SessionError> {
        let mut session = self.session().ok_or(SessionError::NotSignedIn)?;
        session.identity.name = name.to_string();
        self.install(session, true)
    }

    /// Best-effort backend reachability, for a status indicator.
    pub async fn backend_online(&self) -> bool {
        self.auth.health().await
    }

    fn install(&self, session: Session, persist: bool) -> Result<(), SessionError> {
        if persist {
            self.file.save(&PersistedSession {
                token: session.token.clone(),
                user_id: session.identity.user_id.clone(),
                name: session.identity.name.clone(),
                email: session.identity.email.clone(),
            })?;
        }
        match self.inner.write() {
            Ok(mut state) => state.session = Some(session),
            Err(e) => error!("RwLock poisoned installing session: {e}"),
        }
        Ok(())
    }
}

fn email_prefix(email: &str) -> &str {
    email.split('@').next().unwrap_or("User")
}
