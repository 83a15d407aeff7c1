// MIT License
// Session token lifecycle: login, heartbeat, refresh

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{watch, Mutex, MutexGuard};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::{Credentials, SessionPolicy};
use crate::constants::{LOGIN_ACK, LOGIN_PATH, TOKEN_PREFIX};
use crate::error::{BridgeError, Result};
use crate::protocol::{decode_session_poll, Resource};
use crate::transport::Transport;

/// Expiry clock of an authenticated session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct SessionTimers {
    /// Seconds left, as reported by the last heartbeat or refresh.
    expires_in: Duration,
    /// When `expires_in` was read.
    issued_at: Instant,
    last_heartbeat: Instant,
}

#[derive(Debug)]
enum SessionState {
    Unauthenticated,
    Authenticated {
        token: String,
        timers: Option<SessionTimers>,
    },
}

/// What the session needs before the next request can go out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Upkeep {
    Idle,
    Heartbeat,
    Refresh,
}

fn next_upkeep(timers: &SessionTimers, now: Instant, policy: &SessionPolicy) -> Upkeep {
    let remaining = timers
        .expires_in
        .saturating_sub(now.saturating_duration_since(timers.issued_at));
    if remaining <= policy.refresh_threshold {
        Upkeep::Refresh
    } else if now.saturating_duration_since(timers.last_heartbeat) >= policy.heartbeat_interval {
        Upkeep::Heartbeat
    } else {
        Upkeep::Idle
    }
}

/// Owns the panel session token and keeps it alive.
///
/// The panel expires sessions silently: a session that is not polled every
/// few seconds dies, and one that is not refreshed before its expiry window
/// runs out dies too. The state lives behind one async mutex, which is also
/// the ordering lock for every token-bearing request: a caller holding an
/// [`AuthenticatedSession`] knows no other task can swap the token under it.
pub struct SessionManager<T> {
    transport: Arc<T>,
    credentials: Credentials,
    policy: SessionPolicy,
    state: Mutex<SessionState>,
}

/// A live session, held for the duration of one or more requests.
pub struct AuthenticatedSession<'a, T> {
    _guard: MutexGuard<'a, SessionState>,
    token: String,
    transport: &'a T,
}

impl<T> AuthenticatedSession<'_, T> {
    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn transport(&self) -> &T {
        self.transport
    }
}

impl<T: Transport> SessionManager<T> {
    pub fn new(transport: Arc<T>, credentials: Credentials, policy: SessionPolicy) -> Self {
        Self {
            transport,
            credentials,
            policy,
            state: Mutex::new(SessionState::Unauthenticated),
        }
    }

    pub fn transport(&self) -> &Arc<T> {
        &self.transport
    }

    /// Make sure a valid token is in place, logging in, polling or
    /// refreshing as needed.
    ///
    /// Fails with [`BridgeError::Authentication`] only when a login (or the
    /// recovery login after a failed heartbeat/refresh) has failed.
    pub async fn ensure_authenticated(&self) -> Result<()> {
        self.authenticated().await.map(drop)
    }

    /// Like [`ensure_authenticated`](Self::ensure_authenticated), but keeps
    /// the session locked so the caller can issue requests with the token.
    pub async fn authenticated(&self) -> Result<AuthenticatedSession<'_, T>> {
        let mut state = self.state.lock().await;
        self.upkeep(&mut state).await?;
        let token = match &*state {
            SessionState::Authenticated { token, .. } => token.clone(),
            SessionState::Unauthenticated => {
                return Err(BridgeError::Authentication {
                    reason: "no session".to_string(),
                });
            }
        };
        Ok(AuthenticatedSession {
            _guard: state,
            token,
            transport: self.transport.as_ref(),
        })
    }

    /// The current token, if any.
    pub async fn current_token(&self) -> Option<String> {
        match &*self.state.lock().await {
            SessionState::Authenticated { token, .. } => Some(token.clone()),
            SessionState::Unauthenticated => None,
        }
    }

    async fn upkeep(&self, state: &mut SessionState) -> Result<()> {
        let current = match &*state {
            SessionState::Unauthenticated => None,
            SessionState::Authenticated { token, timers } => Some((
                token.clone(),
                timers.as_ref().map(|t| next_upkeep(t, Instant::now(), &self.policy)),
            )),
        };
        let Some((token, upkeep)) = current else {
            info!("Attempting authentication");
            return match self.establish().await {
                Ok(established) => {
                    *state = established;
                    info!("Authenticated with panel");
                    Ok(())
                }
                Err(e) => {
                    error!("Failed to authenticate: {e}");
                    Err(e)
                }
            };
        };

        let outcome = match upkeep {
            Some(Upkeep::Idle) => return Ok(()),
            Some(Upkeep::Heartbeat) => {
                debug!("Session heartbeat");
                self.session_poll(Resource::Poll, &token).await
            }
            Some(Upkeep::Refresh) => {
                info!("Refreshing session");
                self.session_poll(Resource::Refresh, &token).await
            }
            None => Err(BridgeError::Authentication {
                reason: "session has no expiry information".to_string(),
            }),
        };

        match outcome {
            Ok(timers) => {
                *state = SessionState::Authenticated {
                    token,
                    timers: Some(timers),
                };
                Ok(())
            }
            Err(e) => {
                warn!("Failed to poll/refresh session, logging in again: {e}");
                *state = SessionState::Unauthenticated;
                match self.establish().await {
                    Ok(established) => {
                        *state = established;
                        info!("Re-authenticated with panel");
                        Ok(())
                    }
                    Err(e) => {
                        error!("Failed to authenticate again: {e}");
                        Err(e)
                    }
                }
            }
        }
    }

    /// Login with a fresh token, then poll once to learn the expiry window.
    async fn establish(&self) -> Result<SessionState> {
        let token = format!("{}{}", TOKEN_PREFIX, Uuid::new_v4());
        self.login(&token).await?;
        let timers = self
            .session_poll(Resource::Poll, &token)
            .await
            .map_err(|e| BridgeError::Authentication {
                reason: format!("initial session poll failed: {e}"),
            })?;
        Ok(SessionState::Authenticated {
            token,
            timers: Some(timers),
        })
    }

    async fn login(&self, token: &str) -> Result<()> {
        let path = format!("{}?nc={}", LOGIN_PATH, Utc::now().timestamp_millis());
        let form = [
            ("user", self.credentials.username.as_str()),
            ("pass", self.credentials.password.as_str()),
            ("guid", token),
        ];
        let body = self
            .transport
            .post_form(&path, &form)
            .await
            .map_err(|e| BridgeError::Authentication {
                reason: e.to_string(),
            })?;
        if body != LOGIN_ACK {
            return Err(BridgeError::Authentication {
                reason: format!("expected '{}', received '{}'", LOGIN_ACK, body),
            });
        }
        Ok(())
    }

    async fn session_poll(&self, resource: Resource, token: &str) -> Result<SessionTimers> {
        let body = self.transport.get(resource.path(), token).await?;
        let secs = decode_session_poll(resource, &body)?;
        let now = Instant::now();
        debug!("Session expires in {secs}s");
        Ok(SessionTimers {
            expires_in: Duration::from_secs(secs),
            issued_at: now,
            last_heartbeat: now,
        })
    }

    /// Keep the session alive between polls until `shutdown` flips to true.
    pub async fn run_keepalive(self: Arc<Self>, every: Duration, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        debug!("Keep-alive shutting down");
                        break;
                    }
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.ensure_authenticated().await {
                        warn!("Keep-alive failed: {e}");
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::samples::POLL;
    use crate::transport::fake::FakeTransport;

    fn credentials() -> Credentials {
        Credentials {
            username: "installer".to_string(),
            password: "secret".to_string(),
        }
    }

    fn healthy() -> Arc<FakeTransport> {
        let transport = FakeTransport::new();
        transport.reply(LOGIN_PATH, LOGIN_ACK);
        transport.reply("poll.xml", POLL);
        transport.reply("refr.xml", POLL);
        Arc::new(transport)
    }

    fn manager(transport: &Arc<FakeTransport>) -> SessionManager<FakeTransport> {
        SessionManager::new(Arc::clone(transport), credentials(), SessionPolicy::default())
    }

    #[test]
    fn test_next_upkeep() {
        let policy = SessionPolicy::default();
        let start = Instant::now();
        let timers = SessionTimers {
            expires_in: Duration::from_secs(1200),
            issued_at: start,
            last_heartbeat: start,
        };
        assert_eq!(next_upkeep(&timers, start, &policy), Upkeep::Idle);
        assert_eq!(
            next_upkeep(&timers, start + Duration::from_millis(4999), &policy),
            Upkeep::Idle
        );
        assert_eq!(
            next_upkeep(&timers, start + Duration::from_secs(5), &policy),
            Upkeep::Heartbeat
        );
        assert_eq!(
            next_upkeep(&timers, start + Duration::from_secs(1134), &policy),
            Upkeep::Heartbeat
        );
        assert_eq!(
            next_upkeep(&timers, start + Duration::from_secs(1135), &policy),
            Upkeep::Refresh
        );
        // Past expiry still asks for a refresh rather than underflowing.
        assert_eq!(
            next_upkeep(&timers, start + Duration::from_secs(5000), &policy),
            Upkeep::Refresh
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_login_then_initial_poll() {
        let transport = healthy();
        let session = manager(&transport);

        session.ensure_authenticated().await.unwrap();

        let requests = transport.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].path, LOGIN_PATH);
        assert_eq!(requests[0].method, "POST");
        let token = requests[0].token.clone().unwrap();
        assert!(token.starts_with(TOKEN_PREFIX));
        assert_eq!(token.len(), TOKEN_PREFIX.len() + 36);
        assert_eq!(token, token.to_lowercase().replace("guid-", "GUID-"));
        assert!(requests[0]
            .body
            .as_deref()
            .unwrap()
            .starts_with("user=installer&pass=secret&guid="));
        assert_eq!(requests[1].path, "poll.xml");
        assert_eq!(requests[1].token.as_deref(), Some(token.as_str()));
        assert_eq!(session.current_token().await, Some(token));
    }

    #[tokio::test(start_paused = true)]
    async fn test_healthy_session_is_idle() {
        let transport = healthy();
        let session = manager(&transport);
        session.ensure_authenticated().await.unwrap();
        transport.clear_log();

        for _ in 0..5 {
            session.ensure_authenticated().await.unwrap();
        }
        assert!(transport.requests().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_heartbeat_after_interval() {
        let transport = healthy();
        let session = manager(&transport);
        session.ensure_authenticated().await.unwrap();
        transport.clear_log();

        tokio::time::advance(Duration::from_secs(5)).await;
        session.ensure_authenticated().await.unwrap();
        session.ensure_authenticated().await.unwrap();

        assert_eq!(transport.paths(), vec!["poll.xml"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_near_expiry() {
        let transport = healthy();
        let session = manager(&transport);
        session.ensure_authenticated().await.unwrap();
        transport.clear_log();

        tokio::time::advance(Duration::from_secs(1140)).await;
        session.ensure_authenticated().await.unwrap();

        assert_eq!(transport.paths(), vec!["refr.xml"]);
        assert_eq!(transport.count(LOGIN_PATH), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_heartbeat_before_refresh_window() {
        let transport = healthy();
        let session = manager(&transport);
        session.ensure_authenticated().await.unwrap();
        transport.clear_log();

        tokio::time::advance(Duration::from_secs(1134)).await;
        session.ensure_authenticated().await.unwrap();

        assert_eq!(transport.paths(), vec!["poll.xml"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_heartbeat_relogs_with_fresh_token() {
        let transport = healthy();
        let session = manager(&transport);
        session.ensure_authenticated().await.unwrap();
        let first = session.current_token().await.unwrap();

        // Heartbeat fails, then recovery poll succeeds.
        transport.set_status("poll.xml", 500).reply("poll.xml", POLL);
        transport.clear_log();
        tokio::time::advance(Duration::from_secs(5)).await;
        session.ensure_authenticated().await.unwrap();

        let requests = transport.requests();
        assert_eq!(
            transport.paths(),
            vec!["poll.xml", LOGIN_PATH, "poll.xml"]
        );
        let second = session.current_token().await.unwrap();
        assert_ne!(first, second);
        assert_eq!(requests[0].token.as_deref(), Some(first.as_str()));
        assert_eq!(requests[1].token.as_deref(), Some(second.as_str()));
        assert_eq!(requests[2].token.as_deref(), Some(second.as_str()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_refresh_and_failed_login_surfaces_error() {
        let transport = healthy();
        let session = manager(&transport);
        session.ensure_authenticated().await.unwrap();
        let stale = session.current_token().await.unwrap();

        transport.set_status("refr.xml", 500);
        transport.set(LOGIN_PATH, "denied");
        transport.clear_log();
        tokio::time::advance(Duration::from_secs(1140)).await;

        let err = session.ensure_authenticated().await.unwrap_err();
        assert!(matches!(err, BridgeError::Authentication { .. }));
        assert_eq!(session.current_token().await, None);

        // Next attempt starts over with a login; the stale token is never reused.
        transport.set(LOGIN_PATH, LOGIN_ACK);
        session.ensure_authenticated().await.unwrap();
        let requests = transport.requests();
        assert_eq!(
            transport.paths(),
            vec!["refr.xml", LOGIN_PATH, LOGIN_PATH, "poll.xml"]
        );
        assert!(requests[1..]
            .iter()
            .all(|r| r.token.as_deref() != Some(stale.as_str())));
    }

    #[tokio::test(start_paused = true)]
    async fn test_login_rejected() {
        let transport = Arc::new(FakeTransport::new());
        transport.reply(LOGIN_PATH, "Invalid user");
        let session = manager(&transport);

        let err = session.ensure_authenticated().await.unwrap_err();
        match err {
            BridgeError::Authentication { reason } => assert!(reason.contains("Invalid user")),
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(transport.paths(), vec![LOGIN_PATH]);
        assert_eq!(session.current_token().await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_initial_poll_failure_is_authentication_error() {
        let transport = Arc::new(FakeTransport::new());
        transport.reply(LOGIN_PATH, LOGIN_ACK);
        transport.reply("poll.xml", "<html>busy</html>");
        let session = manager(&transport);

        let err = session.ensure_authenticated().await.unwrap_err();
        assert!(matches!(err, BridgeError::Authentication { .. }));
        assert_eq!(session.current_token().await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_timers_relogs() {
        let transport = healthy();
        let session = manager(&transport);
        *session.state.lock().await = SessionState::Authenticated {
            token: "GUID-stale".to_string(),
            timers: None,
        };

        session.ensure_authenticated().await.unwrap();

        assert_eq!(transport.paths(), vec![LOGIN_PATH, "poll.xml"]);
        assert_ne!(session.current_token().await.as_deref(), Some("GUID-stale"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_callers_share_one_login() {
        let transport = {
            let t = FakeTransport::new().with_latency(Duration::from_millis(50));
            t.reply(LOGIN_PATH, LOGIN_ACK);
            t.reply("poll.xml", POLL);
            Arc::new(t)
        };
        let session = Arc::new(manager(&transport));

        let a = tokio::spawn({
            let session = Arc::clone(&session);
            async move { session.ensure_authenticated().await }
        });
        let b = tokio::spawn({
            let session = Arc::clone(&session);
            async move { session.ensure_authenticated().await }
        });
        a.await.unwrap().unwrap();
        b.await.unwrap().unwrap();

        assert_eq!(transport.count(LOGIN_PATH), 1);
        assert_eq!(transport.count("poll.xml"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_keepalive_heartbeats_until_shutdown() {
        let transport = healthy();
        let session = Arc::new(manager(&transport));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let handle = tokio::spawn(
            Arc::clone(&session).run_keepalive(Duration::from_secs(5), shutdown_rx),
        );

        tokio::time::sleep(Duration::from_millis(10_100)).await;
        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();

        // Login at t=0, then a heartbeat at t=5 and t=10.
        assert_eq!(transport.count(LOGIN_PATH), 1);
        assert_eq!(transport.count("poll.xml"), 3);

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(transport.count("poll.xml"), 3);
    }
}
