//! OAuth token lifecycle for the Google APIs.
//!
//! The manager moves between these states:
//!
//! ```text
//! SignedOut -> AwaitingRedirect -> SignedIn -> Expired -> SignedIn
//!                                                      -> SignedOut (interactive required)
//! ```
//!
//! Tokens come from the implicit grant: the user follows the authorization URL and the provider
//! sends them back with the token in the URL fragment. There is no refresh token, so a token that
//! runs out can only be replaced by the identity host without user interaction (when it can) or by
//! another redirect. At most one silent refresh runs at a time, and a silent refresh is skipped
//! while a redirect is outstanding.

mod host;
mod redirect;
mod session;
mod watch;

use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use watch::ExpiryWatch;

pub use host::{Clock, CommandLineHost, IdentityHost, SystemClock, TokenGrant};
pub use redirect::{authorization_request, parse_fragment, FragmentGrant, Redirect, SCOPES};
pub use session::{
    Credential, FileSessionStore, MemorySessionStore, PendingRedirect, Session, SessionStore,
    UserProfile,
};

/// The OAuth client that authorization is requested for.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct AuthSettings {
    pub client_id: String,
    pub redirect_uri: String,
}

impl AuthSettings {
    pub fn new(client_id: impl Into<String>, redirect_uri: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            redirect_uri: redirect_uri.into(),
        }
    }
}

/// Timing of the expiry check.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct AuthOptions {
    /// Refresh once less than this much lifetime is left. Five minutes by default, so that with a
    /// one minute check interval several checks land inside the window before the token expires.
    pub refresh_threshold: chrono::Duration,
    /// How often the remaining lifetime is checked.
    pub check_interval: Duration,
    /// How long a redirect counts as outstanding.
    pub redirect_timeout: chrono::Duration,
}

impl Default for AuthOptions {
    fn default() -> Self {
        Self {
            refresh_threshold: chrono::Duration::minutes(5),
            check_interval: Duration::from_secs(60),
            redirect_timeout: chrono::Duration::minutes(10),
        }
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum AuthState {
    SignedOut { interactive_required: bool },
    AwaitingRedirect,
    SignedIn,
    Expired,
}

/// What `request_access_token` did.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum AccessOutcome {
    /// The user agent must be sent to this URL. The session only continues through
    /// `complete_authorization`.
    Redirect(Redirect),
    /// A new token was obtained silently.
    Refreshed,
}

struct Shared {
    session: Session,
    state: AuthState,
}

pub(crate) struct Inner {
    settings: AuthSettings,
    options: AuthOptions,
    host: Arc<dyn IdentityHost>,
    store: Arc<dyn SessionStore>,
    clock: Arc<dyn Clock>,
    shared: Mutex<Shared>,
    refreshing: AtomicBool,
    /// Bumped on every sign-out. A refresh that started before one must not commit.
    sign_outs: AtomicU64,
    watch: ExpiryWatch,
}

/// Clears the in-flight flag when the refresh finishes, however it finishes.
struct RefreshGuard<'a>(&'a AtomicBool);

impl<'a> RefreshGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for RefreshGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl Inner {
    fn redirect_outstanding(&self, session: &Session, now: DateTime<Utc>) -> bool {
        session
            .pending
            .as_ref()
            .is_some_and(|p| now - p.started_at < self.options.redirect_timeout)
    }

    fn state_of(&self, session: &Session, now: DateTime<Utc>) -> AuthState {
        match &session.credential {
            Some(c) if !c.is_expired(now) => AuthState::SignedIn,
            Some(_) => AuthState::Expired,
            None if self.redirect_outstanding(session, now) => AuthState::AwaitingRedirect,
            None => AuthState::SignedOut {
                interactive_required: false,
            },
        }
    }

    async fn refresh_silently(self: &Arc<Self>) -> Result<()> {
        let Some(_guard) = RefreshGuard::acquire(&self.refreshing) else {
            debug!("A refresh is already running");
            return Err(Error::AuthBusy);
        };
        {
            let shared = self.shared.lock().await;
            if self.redirect_outstanding(&shared.session, self.clock.now()) {
                debug!("A redirect is outstanding, not refreshing");
                return Err(Error::AuthBusy);
            }
        }

        let sign_outs = self.sign_outs.load(Ordering::Acquire);
        let result = self
            .host
            .request_silent_token(&self.settings.client_id, SCOPES)
            .await;
        let mut shared = self.shared.lock().await;
        if self.sign_outs.load(Ordering::Acquire) != sign_outs {
            debug!("Signed out while refreshing, dropping the new token");
            return Err(Error::SilentRefreshFailed(
                "signed out while the refresh was running".into(),
            ));
        }
        match result {
            Ok(grant) => {
                let expiry = expiry_after(self.clock.now(), grant.expires_in);
                shared.session.credential = Some(Credential::new(grant.access_token, expiry));
                shared.state = AuthState::SignedIn;
                self.store.save(&shared.session).await?;
                self.watch.start(self);
                debug!("Token refreshed, valid until {expiry}");
                Ok(())
            }
            Err(e) => {
                shared.state = AuthState::SignedOut {
                    interactive_required: true,
                };
                Err(match e {
                    Error::SilentRefreshFailed(_) => e,
                    other => Error::SilentRefreshFailed(other.to_string()),
                })
            }
        }
    }

    /// Refreshes when the token is about to run out. Returns false once there is no credential to
    /// watch.
    async fn check_expiry(self: &Arc<Self>) -> bool {
        let credential = self.shared.lock().await.session.credential.clone();
        let Some(credential) = credential else {
            return false;
        };
        let remaining = credential.expiry - self.clock.now();
        if remaining < self.options.refresh_threshold {
            debug!("Token expires in {}s, refreshing", remaining.num_seconds());
            match self.refresh_silently().await {
                Ok(()) => info!("Access token refreshed"),
                Err(Error::AuthBusy) => {}
                Err(e) => warn!("{e}"),
            }
        }
        true
    }
}

/// When a token granted at `now` for `expires_in` seconds runs out. Lifetimes that do not fit are
/// read as the provider default.
fn expiry_after(now: DateTime<Utc>, expires_in: i64) -> DateTime<Utc> {
    chrono::Duration::try_seconds(expires_in)
        .and_then(|lifetime| now.checked_add_signed(lifetime))
        .unwrap_or_else(|| now + chrono::Duration::seconds(redirect::DEFAULT_EXPIRES_IN))
}

/// Owns the credential and everything that happens to it.
pub struct AuthManager {
    inner: Arc<Inner>,
    /// The background refresh started by `access_token`, if any.
    refresh_task: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl AuthManager {
    pub fn new(
        settings: AuthSettings,
        host: Arc<dyn IdentityHost>,
        store: Arc<dyn SessionStore>,
    ) -> Self {
        Self::with_parts(
            settings,
            AuthOptions::default(),
            host,
            store,
            Arc::new(SystemClock),
        )
    }

    pub fn with_parts(
        settings: AuthSettings,
        options: AuthOptions,
        host: Arc<dyn IdentityHost>,
        store: Arc<dyn SessionStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                settings,
                options,
                host,
                store,
                clock,
                shared: Mutex::new(Shared {
                    session: Session::default(),
                    state: AuthState::SignedOut {
                        interactive_required: false,
                    },
                }),
                refreshing: AtomicBool::new(false),
                sign_outs: AtomicU64::new(0),
                watch: ExpiryWatch::default(),
            }),
            refresh_task: std::sync::Mutex::new(None),
        }
    }

    /// Loads the stored session and consumes the navigation fragment, if the host has one. A
    /// fragment carrying an error is logged and leaves the manager signed out. Starts the expiry
    /// check when there is a credential.
    ///
    /// # Errors
    /// `Error::AuthInitError` if the identity host is unavailable.
    pub async fn initialize(&self) -> Result<()> {
        if !self.inner.host.is_available().await {
            self.inner.shared.lock().await.state = AuthState::SignedOut {
                interactive_required: false,
            };
            return Err(Error::AuthInitError(
                "the identity host is not available".into(),
            ));
        }

        let session = self.inner.store.load().await?;
        {
            let mut shared = self.inner.shared.lock().await;
            shared.state = self.inner.state_of(&session, self.inner.clock.now());
            shared.session = session;
        }

        if let Some(fragment) = self.inner.host.take_fragment().await {
            if let Err(e) = self.complete_authorization(&fragment).await {
                warn!("The authorization redirect was not accepted: {e}");
            }
        }

        if self.inner.shared.lock().await.session.credential.is_some() {
            self.inner.watch.start(&self.inner);
        }
        debug!("Auth state after initialize: {:?}", self.state().await);
        Ok(())
    }

    /// Interactive requests start a redirect. Non-interactive requests ask the host for a token
    /// without user interaction.
    pub async fn request_access_token(&self, interactive: bool) -> Result<AccessOutcome> {
        if interactive {
            Ok(AccessOutcome::Redirect(self.begin_authorization().await?))
        } else {
            self.refresh_silently().await?;
            Ok(AccessOutcome::Refreshed)
        }
    }

    /// Records a new pending redirect and returns where to send the user. A redirect that is
    /// already pending is replaced.
    ///
    /// # Errors
    /// `Error::AuthBusy` while a silent refresh is running.
    pub async fn begin_authorization(&self) -> Result<Redirect> {
        if self.inner.refreshing.load(Ordering::Acquire) {
            return Err(Error::AuthBusy);
        }
        let redirect = authorization_request(
            &self.inner.settings.client_id,
            &self.inner.settings.redirect_uri,
        )?;
        let mut shared = self.inner.shared.lock().await;
        shared.session.pending = Some(PendingRedirect {
            state: redirect.state.clone(),
            started_at: self.inner.clock.now(),
        });
        shared.state = AuthState::AwaitingRedirect;
        self.inner.store.save(&shared.session).await?;
        info!("Waiting for the authorization redirect");
        Ok(redirect)
    }

    /// Accepts the fragment the provider redirected back with.
    ///
    /// # Errors
    /// `Error::AuthRejected` when the fragment carries an error, has no token, or its `state` does
    /// not match the pending redirect.
    pub async fn complete_authorization(&self, fragment: &str) -> Result<()> {
        let grant = match parse_fragment(fragment) {
            Ok(grant) => grant,
            Err(e) => {
                let mut shared = self.inner.shared.lock().await;
                shared.session.pending = None;
                shared.state = AuthState::SignedOut {
                    interactive_required: true,
                };
                self.inner.store.save(&shared.session).await?;
                return Err(e);
            }
        };

        let access_token = grant.access_token.clone();
        {
            let mut shared = self.inner.shared.lock().await;
            let expected = shared.session.pending.as_ref().map(|p| p.state.as_str());
            match (expected, grant.state.as_deref()) {
                (Some(expected), Some(got)) if expected == got => {}
                (None, _) => {
                    return Err(Error::AuthRejected(
                        "no authorization request is pending".into(),
                    ))
                }
                _ => {
                    return Err(Error::AuthRejected(
                        "the redirect state does not match the pending request".into(),
                    ))
                }
            }

            let expiry = expiry_after(self.inner.clock.now(), grant.expires_in);
            shared.session.credential = Some(Credential::new(grant.access_token, expiry));
            shared.session.pending = None;
            shared.state = AuthState::SignedIn;
            self.inner.store.save(&shared.session).await?;
            info!("Signed in, token valid until {expiry}");
        }
        self.inner.watch.start(&self.inner);

        match self.inner.host.user_profile(&access_token).await {
            Ok(profile) => {
                let mut shared = self.inner.shared.lock().await;
                shared.session.user = Some(profile);
                if let Err(e) = self.inner.store.save(&shared.session).await {
                    warn!("Unable to store the user profile: {e}");
                }
            }
            Err(e) => debug!("Unable to fetch the user profile: {e}"),
        }
        Ok(())
    }

    /// Asks the host for a new token without user interaction. On success the expiry check runs
    /// for the new token.
    ///
    /// # Errors
    /// - `Error::AuthBusy` if a refresh is running or a redirect is outstanding
    /// - `Error::SilentRefreshFailed` if the host could not provide a token; the manager is then
    ///   signed out and needs an interactive sign-in, or if a sign-out happened while it ran
    pub async fn refresh_silently(&self) -> Result<()> {
        self.inner.refresh_silently().await
    }

    /// True iff there is a credential that has not expired. An expired credential starts a
    /// background refresh and reads as signed out for this call.
    pub async fn is_signed_in(&self) -> bool {
        self.access_token().await.is_some()
    }

    /// The current token. Never returns an expired one: an expired credential starts a background
    /// refresh and yields `None`.
    pub async fn access_token(&self) -> Option<String> {
        let mut shared = self.inner.shared.lock().await;
        let credential = shared.session.credential.clone()?;
        if !credential.is_expired(self.inner.clock.now()) {
            return Some(credential.access_token);
        }
        if shared.state == AuthState::SignedIn {
            shared.state = AuthState::Expired;
        }
        drop(shared);
        self.spawn_refresh();
        None
    }

    fn spawn_refresh(&self) {
        if self.inner.refreshing.load(Ordering::Acquire) {
            return;
        }
        let Ok(mut task) = self.refresh_task.lock() else {
            return;
        };
        let inner = Arc::clone(&self.inner);
        *task = Some(tokio::spawn(async move {
            match inner.refresh_silently().await {
                Ok(()) => info!("Access token refreshed"),
                Err(Error::AuthBusy) => {}
                Err(e) => debug!("Background refresh failed: {e}"),
            }
        }));
    }

    fn abort_refresh(&self) {
        if let Ok(mut task) = self.refresh_task.lock() {
            if let Some(task) = task.take() {
                task.abort();
            }
        }
    }

    /// Stops the expiry check and any background refresh, revokes the token (failures are only
    /// logged) and forgets the session. A refresh that is already past the point of cancelling
    /// finds the sign-out and drops its token.
    pub async fn sign_out(&self) -> Result<()> {
        self.abort_refresh();
        let credential = {
            let mut shared = self.inner.shared.lock().await;
            self.inner.sign_outs.fetch_add(1, Ordering::AcqRel);
            self.inner.watch.stop();
            let credential = shared.session.credential.take();
            shared.session = Session::default();
            shared.state = AuthState::SignedOut {
                interactive_required: false,
            };
            credential
        };
        if let Some(credential) = credential {
            if let Err(e) = self.inner.host.revoke(&credential.access_token).await {
                warn!("Unable to revoke the token: {e}");
            }
        }
        self.inner.store.clear().await?;
        info!("Signed out");
        Ok(())
    }

    pub async fn state(&self) -> AuthState {
        self.inner.shared.lock().await.state
    }

    /// When the current token stops being accepted.
    pub async fn expiry(&self) -> Option<DateTime<Utc>> {
        self.inner
            .shared
            .lock()
            .await
            .session
            .credential
            .as_ref()
            .map(|c| c.expiry)
    }

    /// The user's first name, if a profile was fetched when signing in.
    pub async fn user_display_name(&self) -> Option<String> {
        self.inner
            .shared
            .lock()
            .await
            .session
            .user
            .as_ref()
            .and_then(|u| u.name.clone())
    }

    /// Whether the expiry check is running.
    pub fn is_watching(&self) -> bool {
        self.inner.watch.is_running()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    struct ManualClock(std::sync::Mutex<DateTime<Utc>>);

    impl ManualClock {
        fn new() -> Arc<Self> {
            Arc::new(Self(std::sync::Mutex::new(Utc::now())))
        }

        fn advance(&self, by: chrono::Duration) {
            let mut now = self.0.lock().unwrap();
            *now += by;
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            *self.0.lock().unwrap()
        }
    }

    #[derive(Default)]
    struct StubHost {
        unavailable: bool,
        fragment: std::sync::Mutex<Option<String>>,
        silent: std::sync::Mutex<Option<TokenGrant>>,
        silent_calls: AtomicUsize,
        silent_delay: Option<Duration>,
        revoked: std::sync::Mutex<Vec<String>>,
        revoke_fails: bool,
    }

    impl StubHost {
        fn with_fragment(fragment: &str) -> Self {
            Self {
                fragment: std::sync::Mutex::new(Some(fragment.to_string())),
                ..Self::default()
            }
        }

        fn grant_silently(&self, token: &str) {
            *self.silent.lock().unwrap() = Some(TokenGrant {
                access_token: token.to_string(),
                expires_in: 3600,
            });
        }
    }

    #[async_trait::async_trait]
    impl IdentityHost for StubHost {
        async fn is_available(&self) -> bool {
            !self.unavailable
        }

        async fn take_fragment(&self) -> Option<String> {
            self.fragment.lock().unwrap().take()
        }

        async fn request_silent_token(&self, _: &str, _: &[&str]) -> Result<TokenGrant> {
            self.silent_calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.silent_delay {
                tokio::time::sleep(delay).await;
            }
            self.silent
                .lock()
                .unwrap()
                .clone()
                .ok_or_else(|| Error::SilentRefreshFailed("interaction_required".into()))
        }

        async fn revoke(&self, access_token: &str) -> Result<()> {
            self.revoked.lock().unwrap().push(access_token.to_string());
            if self.revoke_fails {
                return Err(anyhow::anyhow!("network down").into());
            }
            Ok(())
        }

        async fn user_profile(&self, _: &str) -> Result<UserProfile> {
            Ok(UserProfile {
                name: Some("Ana".into()),
                email: Some("ana@example.com".into()),
            })
        }
    }

    struct Fixture {
        manager: AuthManager,
        host: Arc<StubHost>,
        store: Arc<MemorySessionStore>,
        clock: Arc<ManualClock>,
    }

    fn fixture_with(host: StubHost, session: Session, options: AuthOptions) -> Fixture {
        let host = Arc::new(host);
        let store = Arc::new(MemorySessionStore::new(session));
        let clock = ManualClock::new();
        let manager = AuthManager::with_parts(
            AuthSettings::new("1234.apps.googleusercontent.com", "http://localhost"),
            options,
            host.clone(),
            store.clone(),
            clock.clone(),
        );
        Fixture {
            manager,
            host,
            store,
            clock,
        }
    }

    fn fixture(host: StubHost) -> Fixture {
        fixture_with(host, Session::default(), AuthOptions::default())
    }

    /// A session whose token expires `secs` seconds from now.
    fn session_expiring_in(secs: i64) -> Session {
        Session {
            credential: Some(Credential::new(
                "old-token",
                Utc::now() + chrono::Duration::seconds(secs),
            )),
            ..Session::default()
        }
    }

    async fn wait_for<F: Fn() -> bool>(condition: F) {
        for _ in 0..100 {
            if condition() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition was not met in time");
    }

    #[tokio::test]
    async fn test_initialize_unavailable_host() {
        let f = fixture(StubHost {
            unavailable: true,
            ..StubHost::default()
        });
        let err = f.manager.initialize().await.unwrap_err();
        assert!(matches!(err, Error::AuthInitError(_)));
        assert_eq!(
            f.manager.state().await,
            AuthState::SignedOut {
                interactive_required: false
            }
        );
    }

    #[tokio::test]
    async fn test_redirect_round_trip() {
        let f = fixture(StubHost::default());
        f.manager.initialize().await.unwrap();
        assert!(!f.manager.is_signed_in().await);

        let outcome = f.manager.request_access_token(true).await.unwrap();
        let redirect = match outcome {
            AccessOutcome::Redirect(redirect) => redirect,
            other => panic!("unexpected {other:?}"),
        };
        assert_eq!(f.manager.state().await, AuthState::AwaitingRedirect);
        let stored = f.store.load().await.unwrap();
        assert_eq!(stored.pending.unwrap().state, redirect.state);

        let fragment = format!(
            "#access_token=ya29.fresh&expires_in=3599&state={}",
            redirect.state
        );
        f.manager.complete_authorization(&fragment).await.unwrap();
        assert_eq!(f.manager.state().await, AuthState::SignedIn);
        assert_eq!(f.manager.access_token().await.as_deref(), Some("ya29.fresh"));
        assert_eq!(f.manager.user_display_name().await.as_deref(), Some("Ana"));
        assert!(f.manager.is_watching());

        let stored = f.store.load().await.unwrap();
        assert!(stored.pending.is_none());
        assert_eq!(stored.credential.unwrap().access_token, "ya29.fresh");
    }

    #[tokio::test]
    async fn test_state_mismatch_is_rejected() {
        let f = fixture(StubHost::default());
        f.manager.initialize().await.unwrap();
        f.manager.begin_authorization().await.unwrap();
        let err = f
            .manager
            .complete_authorization("#access_token=evil&state=forged")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::AuthRejected(_)));
        assert_eq!(f.manager.state().await, AuthState::AwaitingRedirect);
        assert_eq!(f.manager.access_token().await, None);
    }

    #[tokio::test]
    async fn test_unsolicited_redirect_is_rejected() {
        let f = fixture(StubHost::default());
        f.manager.initialize().await.unwrap();
        let err = f
            .manager
            .complete_authorization("#access_token=abc&state=abc")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::AuthRejected(_)));
    }

    #[tokio::test]
    async fn test_error_fragment_signs_out() {
        let f = fixture(StubHost::default());
        f.manager.initialize().await.unwrap();
        let redirect = f.manager.begin_authorization().await.unwrap();
        let err = f
            .manager
            .complete_authorization(&format!("#error=access_denied&state={}", redirect.state))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::AuthRejected(_)));
        assert_eq!(
            f.manager.state().await,
            AuthState::SignedOut {
                interactive_required: true
            }
        );
        assert!(f.store.load().await.unwrap().pending.is_none());
    }

    #[tokio::test]
    async fn test_initialize_consumes_fragment() {
        let session = Session {
            pending: Some(PendingRedirect {
                state: "s1".into(),
                started_at: Utc::now(),
            }),
            ..Session::default()
        };
        let f = fixture_with(
            StubHost::with_fragment("access_token=tok&expires_in=120&state=s1"),
            session,
            AuthOptions::default(),
        );
        f.manager.initialize().await.unwrap();
        assert_eq!(f.manager.state().await, AuthState::SignedIn);
        assert_eq!(f.manager.access_token().await.as_deref(), Some("tok"));
        assert!(f.host.fragment.lock().unwrap().is_none());
        assert!(f.manager.expiry().await.is_some());
    }

    #[tokio::test]
    async fn test_initialize_with_error_fragment_stays_signed_out() {
        let f = fixture(StubHost::with_fragment("error=access_denied"));
        f.manager.initialize().await.unwrap();
        assert!(!f.manager.is_signed_in().await);
        assert!(!f.manager.is_watching());
    }

    #[tokio::test]
    async fn test_expired_token_is_never_returned() {
        let f = fixture_with(
            StubHost::default(),
            session_expiring_in(3600),
            AuthOptions::default(),
        );
        f.host.grant_silently("new-token");
        f.manager.initialize().await.unwrap();
        assert_eq!(f.manager.access_token().await.as_deref(), Some("old-token"));

        f.clock.advance(chrono::Duration::hours(2));
        assert_eq!(f.manager.access_token().await, None);
        assert_eq!(f.manager.state().await, AuthState::Expired);

        let host = f.host.clone();
        wait_for(|| host.silent_calls.load(Ordering::SeqCst) == 1).await;
        wait_for(|| f.manager.inner.refreshing.load(Ordering::SeqCst) == false).await;
        assert_eq!(f.manager.access_token().await.as_deref(), Some("new-token"));
        assert!(f.manager.is_signed_in().await);
    }

    #[tokio::test]
    async fn test_silent_refresh_failure_requires_interaction() {
        let f = fixture_with(
            StubHost::default(),
            session_expiring_in(-10),
            AuthOptions::default(),
        );
        f.manager.initialize().await.unwrap();
        assert_eq!(f.manager.state().await, AuthState::Expired);
        let err = f.manager.request_access_token(false).await.unwrap_err();
        assert!(matches!(err, Error::SilentRefreshFailed(_)));
        assert_eq!(
            f.manager.state().await,
            AuthState::SignedOut {
                interactive_required: true
            }
        );
        // The expired credential is kept for another attempt
        assert!(f.store.load().await.unwrap().credential.is_some());
    }

    #[tokio::test]
    async fn test_silent_refresh_skipped_while_redirect_outstanding() {
        let f = fixture(StubHost::default());
        f.host.grant_silently("silent");
        f.manager.initialize().await.unwrap();
        f.manager.begin_authorization().await.unwrap();

        let err = f.manager.refresh_silently().await.unwrap_err();
        assert!(matches!(err, Error::AuthBusy));
        assert_eq!(f.host.silent_calls.load(Ordering::SeqCst), 0);

        f.clock.advance(chrono::Duration::minutes(11));
        f.manager.refresh_silently().await.unwrap();
        assert_eq!(f.manager.access_token().await.as_deref(), Some("silent"));
    }

    #[tokio::test]
    async fn test_interactive_request_while_refreshing_is_busy() {
        let f = fixture(StubHost::default());
        f.manager.initialize().await.unwrap();
        let guard = RefreshGuard::acquire(&f.manager.inner.refreshing).unwrap();
        assert!(matches!(
            f.manager.request_access_token(true).await,
            Err(Error::AuthBusy)
        ));
        assert!(matches!(
            f.manager.refresh_silently().await,
            Err(Error::AuthBusy)
        ));
        drop(guard);
        assert!(f.manager.begin_authorization().await.is_ok());
    }

    #[tokio::test]
    async fn test_sign_out_revokes_and_clears() {
        let f = fixture_with(
            StubHost {
                revoke_fails: true,
                ..StubHost::default()
            },
            session_expiring_in(3600),
            AuthOptions::default(),
        );
        f.manager.initialize().await.unwrap();
        assert!(f.manager.is_watching());

        f.manager.sign_out().await.unwrap();
        assert_eq!(*f.host.revoked.lock().unwrap(), vec!["old-token".to_string()]);
        assert_eq!(f.store.load().await.unwrap(), Session::default());
        assert_eq!(f.manager.access_token().await, None);
        assert!(!f.manager.is_watching());
        assert_eq!(
            f.manager.state().await,
            AuthState::SignedOut {
                interactive_required: false
            }
        );
    }

    #[tokio::test]
    async fn test_expiry_watch_refreshes_before_expiry() {
        let options = AuthOptions {
            check_interval: Duration::from_millis(10),
            ..AuthOptions::default()
        };
        let f = fixture_with(StubHost::default(), session_expiring_in(120), options);
        f.host.grant_silently("proactive");
        f.manager.initialize().await.unwrap();

        let host = f.host.clone();
        wait_for(|| host.silent_calls.load(Ordering::SeqCst) >= 1).await;
        wait_for(|| f.manager.inner.refreshing.load(Ordering::SeqCst) == false).await;
        assert_eq!(f.manager.access_token().await.as_deref(), Some("proactive"));
    }

    #[tokio::test]
    async fn test_expiry_watch_leaves_fresh_tokens_alone() {
        let options = AuthOptions {
            check_interval: Duration::from_millis(10),
            ..AuthOptions::default()
        };
        let f = fixture_with(StubHost::default(), session_expiring_in(3600), options);
        f.host.grant_silently("unused");
        f.manager.initialize().await.unwrap();
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(f.host.silent_calls.load(Ordering::SeqCst), 0);
        assert_eq!(f.manager.access_token().await.as_deref(), Some("old-token"));
    }

    #[tokio::test]
    async fn test_sign_out_cancels_background_refresh() {
        let f = fixture_with(
            StubHost {
                silent_delay: Some(Duration::from_millis(100)),
                ..StubHost::default()
            },
            session_expiring_in(-10),
            AuthOptions::default(),
        );
        f.host.grant_silently("zombie");
        f.manager.initialize().await.unwrap();
        assert_eq!(f.manager.access_token().await, None);
        let host = f.host.clone();
        wait_for(|| host.silent_calls.load(Ordering::SeqCst) == 1).await;

        f.manager.sign_out().await.unwrap();
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(f.manager.access_token().await, None);
        assert_eq!(
            f.manager.state().await,
            AuthState::SignedOut {
                interactive_required: false
            }
        );
        assert_eq!(f.store.load().await.unwrap(), Session::default());
        assert!(!f.manager.is_watching());
    }

    #[tokio::test]
    async fn test_refresh_finishing_after_sign_out_is_dropped() {
        let f = fixture_with(
            StubHost {
                silent_delay: Some(Duration::from_millis(100)),
                ..StubHost::default()
            },
            session_expiring_in(-10),
            AuthOptions::default(),
        );
        f.host.grant_silently("late");
        f.manager.initialize().await.unwrap();

        let host = f.host.clone();
        let (refreshed, signed_out) = tokio::join!(f.manager.refresh_silently(), async {
            wait_for(|| host.silent_calls.load(Ordering::SeqCst) == 1).await;
            f.manager.sign_out().await
        });
        signed_out.unwrap();
        assert!(matches!(refreshed, Err(Error::SilentRefreshFailed(_))));
        assert_eq!(f.manager.access_token().await, None);
        assert_eq!(
            f.manager.state().await,
            AuthState::SignedOut {
                interactive_required: false
            }
        );
        assert_eq!(f.store.load().await.unwrap(), Session::default());
        assert!(!f.manager.is_watching());
    }

    #[tokio::test]
    async fn test_silent_refresh_starts_expiry_watch() {
        let f = fixture(StubHost::default());
        f.host.grant_silently("silent");
        f.manager.initialize().await.unwrap();
        assert!(!f.manager.is_watching());

        let outcome = f.manager.request_access_token(false).await.unwrap();
        assert_eq!(outcome, AccessOutcome::Refreshed);
        assert!(f.manager.is_signed_in().await);
        assert!(f.manager.is_watching());
    }

    #[tokio::test]
    async fn test_background_refresh_restarts_expiry_watch() {
        let f = fixture_with(
            StubHost::default(),
            session_expiring_in(-10),
            AuthOptions::default(),
        );
        f.host.grant_silently("revived");
        f.manager.initialize().await.unwrap();
        f.manager.inner.watch.stop();
        assert!(!f.manager.is_watching());

        assert_eq!(f.manager.access_token().await, None);
        let host = f.host.clone();
        wait_for(|| host.silent_calls.load(Ordering::SeqCst) == 1).await;
        wait_for(|| f.manager.is_watching()).await;
        assert_eq!(f.manager.access_token().await.as_deref(), Some("revived"));
    }

    #[tokio::test]
    async fn test_complete_authorization_with_huge_expiry() {
        let f = fixture(StubHost::default());
        f.manager.initialize().await.unwrap();
        let redirect = f.manager.begin_authorization().await.unwrap();
        let fragment = format!(
            "#access_token=t&expires_in=9223372036854775807&state={}",
            redirect.state
        );
        f.manager.complete_authorization(&fragment).await.unwrap();
        assert_eq!(f.manager.access_token().await.as_deref(), Some("t"));
        let expiry = f.manager.expiry().await.unwrap();
        assert_eq!(expiry, f.clock.now() + chrono::Duration::days(1));
    }

    #[tokio::test]
    async fn test_silent_grant_with_huge_expiry() {
        let f = fixture(StubHost::default());
        *f.host.silent.lock().unwrap() = Some(TokenGrant {
            access_token: "t".into(),
            expires_in: i64::MAX,
        });
        f.manager.initialize().await.unwrap();
        f.manager.refresh_silently().await.unwrap();
        let expiry = f.manager.expiry().await.unwrap();
        assert_eq!(expiry, f.clock.now() + chrono::Duration::seconds(3600));
    }

    #[test]
    fn test_expiry_after() {
        let now = Utc::now();
        assert_eq!(
            expiry_after(now, 120),
            now + chrono::Duration::seconds(120)
        );
        assert_eq!(
            expiry_after(now, i64::MAX),
            now + chrono::Duration::seconds(3600)
        );
        assert_eq!(
            expiry_after(now, i64::MIN),
            now + chrono::Duration::seconds(3600)
        );
    }

    #[test]
    fn test_default_options() {
        let options = AuthOptions::default();
        assert_eq!(options.refresh_threshold, chrono::Duration::minutes(5));
        assert_eq!(options.check_interval, Duration::from_secs(60));
        assert!(
            options.refresh_threshold.to_std().unwrap() > options.check_interval,
            "the threshold must span at least one check"
        );
        assert_eq!(options.redirect_timeout, chrono::Duration::minutes(10));
    }
}
