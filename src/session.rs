use std::sync::atomic::{AtomicBool, Ordering};

use derive_more::Display;
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use tokio::sync::{Mutex, watch};

use crate::config::Endpoints;
use crate::error::{Error, OperationFailure};
use crate::notify::Notifier;
use crate::store::{KeyValueStore, REFRESH_TOKEN_KEY, TOKEN_KEY};
use crate::transport::{ApiRequest, Method, Transport};
use crate::types::{
    AccessToken, LoginResponse, Operation, PasswordChange, Payload, RefreshToken, UserProfile,
};

/// Where the session stands.
///
/// `Anonymous → Resolving` when a token is installed, `Resolving →
/// Authenticated | Anonymous` when the profile fetch settles, and any phase
/// back to `Anonymous` on logout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum SessionPhase {
    #[display("anonymous")]
    Anonymous,
    #[display("resolving")]
    Resolving,
    #[display("authenticated")]
    Authenticated,
}

/// What views read from the session.
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub struct SessionSnapshot {
    pub user: Option<UserProfile>,
    pub loading: bool,
    pub phase: SessionPhase,
}

impl SessionSnapshot {
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.user.is_some()
    }
}

struct SessionState {
    token: Option<AccessToken>,
    refresh_token: Option<RefreshToken>,
    user: Option<UserProfile>,
    loading: bool,
    phase: SessionPhase,
    // Bumped whenever `token` changes; responses issued under an older
    // epoch are not applied.
    epoch: u64,
}

impl SessionState {
    fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            user: self.user.clone(),
            loading: self.loading,
            phase: self.phase,
        }
    }

    fn clear(&mut self) {
        self.token = None;
        self.refresh_token = None;
        self.user = None;
        self.phase = SessionPhase::Anonymous;
        self.epoch += 1;
    }
}

/// Owns the authentication state of one client of the identity service.
///
/// Collaborators are injected; share the manager between views with an
/// `Arc`. Networked operations are serialized: a second call waits for the
/// one in flight to settle. [`logout`](Self::logout) never waits.
///
/// ```rust,ignore
/// use std::sync::Arc;
/// use fundtransfer_accounts::{ClientConfig, FileStore, SessionManager, TracingNotifier};
///
/// let config = ClientConfig::from_env()?;
/// let store = FileStore::open("session.json")?;
/// let session = Arc::new(SessionManager::connect(&config, store, TracingNotifier).await);
///
/// if let Err(failure) = session.login(serde_json::json!({"username": "a", "password": "b"})).await {
///     eprintln!("{failure}");
/// }
/// ```
pub struct SessionManager<T, S, N> {
    transport: T,
    store: S,
    notifier: N,
    endpoints: Endpoints,
    state: RwLock<SessionState>,
    gate: Mutex<()>,
    initialized: AtomicBool,
    updates: watch::Sender<SessionSnapshot>,
}

impl<T, S, N> SessionManager<T, S, N>
where
    T: Transport,
    S: KeyValueStore,
    N: Notifier,
{
    /// Create a manager, restoring any persisted token.
    ///
    /// With no persisted token the session is settled immediately
    /// (`loading == false`). Otherwise it stays loading until
    /// [`initialize`](Self::initialize) has fetched the profile.
    pub fn new(transport: T, store: S, notifier: N) -> Self {
        let token = read_entry(&store, TOKEN_KEY).map(AccessToken::new);
        let refresh_token = read_entry(&store, REFRESH_TOKEN_KEY).map(RefreshToken::new);

        let resolving = token.is_some();
        let state = SessionState {
            token,
            refresh_token,
            user: None,
            loading: resolving,
            phase: if resolving {
                SessionPhase::Resolving
            } else {
                SessionPhase::Anonymous
            },
            epoch: 0,
        };
        let (updates, _) = watch::channel(state.snapshot());

        Self {
            transport,
            store,
            notifier,
            endpoints: Endpoints::default(),
            state: RwLock::new(state),
            gate: Mutex::new(()),
            initialized: AtomicBool::new(false),
            updates,
        }
    }

    /// Override the identity service paths.
    #[must_use]
    pub fn with_endpoints(mut self, endpoints: Endpoints) -> Self {
        self.endpoints = endpoints;
        self
    }

    /// Resolve the restored session. Runs once; later calls return at once.
    pub async fn initialize(&self) {
        if self.initialized.swap(true, Ordering::SeqCst) {
            return;
        }
        let _turn = self.gate.lock().await;
        if self.state.read().token.is_some() {
            self.fetch_current_user().await;
        }
    }

    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        self.state.read().snapshot()
    }

    /// Receive every session change.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.updates.subscribe()
    }

    #[must_use]
    pub fn user(&self) -> Option<UserProfile> {
        self.state.read().user.clone()
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.state.read().user.is_some()
    }

    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.state.read().loading
    }

    #[must_use]
    pub fn phase(&self) -> SessionPhase {
        self.state.read().phase
    }

    #[must_use]
    pub fn refresh_token(&self) -> Option<RefreshToken> {
        self.state.read().refresh_token.clone()
    }

    /// `Authorization` value attached to outgoing requests, if any.
    #[must_use]
    pub fn credential_header(&self) -> Option<String> {
        self.state.read().token.as_ref().map(AccessToken::bearer)
    }

    #[must_use]
    pub fn store(&self) -> &S {
        &self.store
    }

    #[must_use]
    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    /// Sign in with credentials forwarded verbatim to the identity service.
    ///
    /// On success both tokens are persisted, the returned profile becomes
    /// the session user, and the profile is fetched again under the new token.
    ///
    /// # Errors
    ///
    /// Returns [`OperationFailure`] with the session left untouched.
    pub async fn login(&self, credentials: impl Into<Payload>) -> Result<(), OperationFailure> {
        let _turn = self.gate.lock().await;
        let request = self
            .request(Method::Post, &self.endpoints.login)
            .with_body(into_body(credentials));

        let response: LoginResponse = match self.call(request).await {
            Ok(response) => response,
            Err(error) => return Err(self.reject(Operation::Login, &error)),
        };
        if let Err(error) = self.install(response) {
            return Err(self.reject(Operation::Login, &error));
        }

        tracing::info!("Login successful");
        self.notifier.success(Operation::Login.success_message());
        self.fetch_current_user().await;
        Ok(())
    }

    /// Create an account. Never signs the caller in.
    ///
    /// # Errors
    ///
    /// Returns [`OperationFailure`] if the identity service refuses the registration.
    pub async fn register(&self, profile_data: impl Into<Payload>) -> Result<(), OperationFailure> {
        let _turn = self.gate.lock().await;
        let request = self
            .request(Method::Post, &self.endpoints.register)
            .with_body(into_body(profile_data));

        if let Err(error) = self.transport.send(request).await {
            return Err(self.reject(Operation::Register, &error));
        }

        tracing::info!("Registration successful");
        self.notifier.success(Operation::Register.success_message());
        Ok(())
    }

    /// Drop the session: persisted tokens, in-memory state and credential.
    ///
    /// Idempotent. Store failures are logged; the in-memory session is
    /// cleared regardless.
    pub fn logout(&self) {
        self.update(|state| {
            for key in [TOKEN_KEY, REFRESH_TOKEN_KEY] {
                if let Err(error) = self.store.remove(key) {
                    tracing::error!(%error, key, "Failed to clear persisted session entry");
                }
            }
            state.clear();
        });

        tracing::info!("Logged out");
        self.notifier.success("Logged out successfully");
    }

    /// Send profile changes; the returned profile replaces the session user.
    ///
    /// # Errors
    ///
    /// Returns [`OperationFailure`] with the session user unchanged, also
    /// when the session was logged out before the response arrived.
    pub async fn update_profile(
        &self,
        profile_data: impl Into<Payload>,
    ) -> Result<(), OperationFailure> {
        let _turn = self.gate.lock().await;
        let epoch = self.state.read().epoch;
        let request = self
            .request(Method::Put, &self.endpoints.profile)
            .with_body(into_body(profile_data));

        let profile: UserProfile = match self.call(request).await {
            Ok(profile) => profile,
            Err(error) => return Err(self.reject(Operation::UpdateProfile, &error)),
        };
        let mut applied = false;
        self.update(|state| {
            if state.epoch == epoch && state.token.is_some() {
                state.user = Some(profile);
                state.phase = SessionPhase::Authenticated;
                applied = true;
            }
        });
        if !applied {
            return Err(self.reject(Operation::UpdateProfile, &Error::SessionChanged));
        }

        self.notifier.success(Operation::UpdateProfile.success_message());
        Ok(())
    }

    /// Change the account password. The current token stays valid.
    ///
    /// The confirmation field is not sent; check it first with
    /// [`PasswordChange::validate`].
    ///
    /// # Errors
    ///
    /// Returns [`OperationFailure`] if the identity service refuses the change.
    pub async fn change_password(&self, form: &PasswordChange) -> Result<(), OperationFailure> {
        let _turn = self.gate.lock().await;
        let body = match serde_json::to_value(form) {
            Ok(body) => body,
            Err(error) => {
                return Err(self.reject(Operation::ChangePassword, &Error::from(error)));
            }
        };
        let request = self
            .request(Method::Put, &self.endpoints.change_password)
            .with_body(body);

        if let Err(error) = self.transport.send(request).await {
            return Err(self.reject(Operation::ChangePassword, &error));
        }

        self.notifier.success(Operation::ChangePassword.success_message());
        Ok(())
    }

    /// Load the profile for the current token; any failure ends the session.
    ///
    /// Callers hold the gate.
    async fn fetch_current_user(&self) {
        let epoch = self.state.read().epoch;
        let request = self.request(Method::Get, &self.endpoints.profile);

        match self.call::<UserProfile>(request).await {
            Ok(profile) => self.update(|state| {
                if state.epoch == epoch {
                    state.user = Some(profile);
                    state.phase = SessionPhase::Authenticated;
                }
                state.loading = false;
            }),
            Err(error) => {
                tracing::error!(%error, "Error fetching user profile");
                if self.state.read().epoch == epoch {
                    self.logout();
                }
                self.update(|state| state.loading = false);
            }
        }
    }

    /// Persist and adopt the tokens of a successful login.
    fn install(&self, response: LoginResponse) -> Result<(), Error> {
        let LoginResponse {
            access,
            refresh,
            user,
        } = response;

        let mut result = Ok(());
        self.update(|state| {
            let persisted = self
                .store
                .set(TOKEN_KEY, access.as_str())
                .and_then(|()| self.store.set(REFRESH_TOKEN_KEY, refresh.as_str()));
            if let Err(error) = persisted {
                // Leave the store as it was before the attempt.
                restore_entry(
                    &self.store,
                    TOKEN_KEY,
                    state.token.as_ref().map(AccessToken::as_str),
                );
                restore_entry(
                    &self.store,
                    REFRESH_TOKEN_KEY,
                    state.refresh_token.as_ref().map(RefreshToken::as_str),
                );
                result = Err(error);
                return;
            }
            state.token = Some(access);
            state.refresh_token = Some(refresh);
            state.user = Some(user);
            state.phase = SessionPhase::Resolving;
            state.epoch += 1;
        });
        result
    }

    fn request(&self, method: Method, path: &str) -> ApiRequest {
        ApiRequest::new(method, path).with_bearer(self.state.read().token.clone())
    }

    async fn call<R: DeserializeOwned>(&self, request: ApiRequest) -> Result<R, Error> {
        let body = self.transport.send(request).await?;
        Ok(serde_json::from_value(body)?)
    }

    fn reject(&self, operation: Operation, error: &Error) -> OperationFailure {
        let failure = OperationFailure::from_error(operation, error);
        tracing::warn!(%operation, %error, "Session operation failed");
        self.notifier.failure(failure.message());
        failure
    }

    /// Apply a state change and publish the result, under one write lock.
    fn update(&self, change: impl FnOnce(&mut SessionState)) {
        let mut state = self.state.write();
        change(&mut state);
        self.updates.send_replace(state.snapshot());
    }
}

#[cfg(feature = "http")]
impl<S, N> SessionManager<crate::transport::HttpTransport, S, N>
where
    S: KeyValueStore,
    N: Notifier,
{
    /// Create an HTTP-backed manager for `config` and resolve the restored session.
    pub async fn connect(config: &crate::config::ClientConfig, store: S, notifier: N) -> Self {
        let manager = Self::new(crate::transport::HttpTransport::new(config), store, notifier)
            .with_endpoints(config.endpoints().clone());
        manager.initialize().await;
        manager
    }
}

fn into_body(payload: impl Into<Payload>) -> serde_json::Value {
    let payload: Payload = payload.into();
    payload.into()
}

fn read_entry(store: &impl KeyValueStore, key: &str) -> Option<String> {
    store.get(key).unwrap_or_else(|error| {
        tracing::error!(%error, key, "Failed to read persisted session entry");
        None
    })
}

fn restore_entry(store: &impl KeyValueStore, key: &str, previous: Option<&str>) {
    let restored = match previous {
        Some(value) => store.set(key, value),
        None => store.remove(key),
    };
    if let Err(error) = restored {
        tracing::error!(%error, key, "Failed to restore persisted session entry");
    }
}
