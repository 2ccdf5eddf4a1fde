//! Request executor - runs an upstream call on behalf of a session
//!
//! Resolves the session, checks the domain binding and runs the call with the
//! session's access token. When the upstream reports an expired token the
//! executor refreshes once and retries once. Refreshes for one session are
//! serialized: a caller that finds the session already rotated by a
//! concurrent refresh reuses the new token instead of spending the refresh
//! token a second time.

use crate::error::ExecError;
use crate::session::{Session, SessionStore};
use crate::upstream::{TokenRefresher, UpstreamFailure};
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};

/// Default value of the upstream `error` field that signals token expiry
pub const EXPIRED_TOKEN_ERROR: &str = "expired_token";

/// Successful execution result
#[derive(Debug, Clone, PartialEq)]
pub struct Executed<T> {
    pub data: T,
    /// Set when the token changed during the invocation; the client should adopt it
    pub new_access_token: Option<String>,
}

pub struct RequestExecutor {
    store: Arc<dyn SessionStore>,
    refresher: Arc<dyn TokenRefresher>,
    expired_error: String,
    refresh_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl RequestExecutor {
    pub fn new(store: Arc<dyn SessionStore>, refresher: Arc<dyn TokenRefresher>) -> Self {
        Self {
            store,
            refresher,
            expired_error: EXPIRED_TOKEN_ERROR.to_string(),
            refresh_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_expired_error(mut self, sentinel: impl Into<String>) -> Self {
        self.expired_error = sentinel.into();
        self
    }

    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    /// Run `call` with the session's access token, refreshing at most once
    pub async fn execute<T, F, Fut>(
        &self,
        session_id: &str,
        domain: &str,
        call: F,
        supplied_token: Option<&str>,
    ) -> Result<Executed<T>, ExecError>
    where
        F: Fn(String) -> Fut,
        Fut: Future<Output = Result<T, UpstreamFailure>>,
    {
        let Some(mut session) = self.store.get(session_id).await else {
            log::debug!("Unknown session {}", session_id);
            return Err(ExecError::Unauthorized);
        };

        if session.domain != domain {
            log::warn!(
                "Session {} is bound to {}, request targeted {}",
                session_id,
                session.domain,
                domain
            );
            return Err(ExecError::DomainMismatch {
                expected: session.domain,
                actual: domain.to_string(),
            });
        }

        if let Some(token) = supplied_token.filter(|t| !t.is_empty() && *t != session.access_token) {
            session = self.adopt(session_id, &session, token).await?;
        }

        let failure = match call(session.access_token.clone()).await {
            Ok(data) => {
                return Ok(Executed {
                    data,
                    new_access_token: None,
                })
            }
            Err(failure) => failure,
        };

        if !failure.is_token_expired(&self.expired_error) {
            log::error!("Upstream call failed for session {}: {}", session_id, failure);
            return Err(upstream_error(failure));
        }

        if session.refresh_token.is_none() {
            log::warn!("Token expired for session {} with no refresh token", session_id);
            return Err(ExecError::Unauthorized);
        }

        let token = self.refresh(session_id, &session).await?;
        match call(token.clone()).await {
            Ok(data) => Ok(Executed {
                data,
                new_access_token: Some(token),
            }),
            Err(failure) => {
                log::error!("Retry after refresh failed for session {}: {}", session_id, failure);
                Err(upstream_error(failure))
            }
        }
    }

    /// Store a client-supplied token unless the session moved since `observed` was read
    async fn adopt(&self, session_id: &str, observed: &Session, token: &str) -> Result<Session, ExecError> {
        let lock = self.refresh_lock(session_id);
        let _guard = lock.lock().await;

        let Some(mut current) = self.store.get(session_id).await else {
            return Err(ExecError::Unauthorized);
        };

        if current.generation != observed.generation {
            log::debug!(
                "Session {} rotated before the supplied token could be adopted, keeping stored token",
                session_id
            );
            return Ok(current);
        }

        log::debug!("Adopting client-supplied access token for session {}", session_id);
        current.rotate(token.to_string(), None);
        self.store.put(current.clone()).await;
        Ok(current)
    }

    /// Produce a fresh access token for `observed`, the session state that saw the expiry
    async fn refresh(&self, session_id: &str, observed: &Session) -> Result<String, ExecError> {
        let lock = self.refresh_lock(session_id);
        let _guard = lock.lock().await;

        let Some(mut current) = self.store.get(session_id).await else {
            return Err(ExecError::TokenExpiredFinal);
        };

        if current.generation != observed.generation && current.access_token != observed.access_token {
            log::debug!("Session {} was refreshed concurrently", session_id);
            return Ok(current.access_token);
        }

        let Some(refresh_token) = current.refresh_token.clone() else {
            return Err(ExecError::Unauthorized);
        };

        match self.refresher.refresh(&refresh_token).await {
            Ok(pair) => {
                log::info!("Refreshed access token for session {}", session_id);
                current.rotate(pair.access_token.clone(), pair.refresh_token);
                self.store.put(current).await;
                Ok(pair.access_token)
            }
            Err(failure) => {
                log::warn!(
                    "Token refresh failed for session {} ({}), removing session",
                    session_id,
                    failure
                );
                self.store.delete(session_id).await;
                Err(ExecError::TokenExpiredFinal)
            }
        }
    }

    fn refresh_lock(&self, session_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.refresh_locks.lock().unwrap_or_else(|e| e.into_inner());
        locks.retain(|id, lock| id == session_id || Arc::strong_count(lock) > 1);
        locks.entry(session_id.to_string()).or_default().clone()
    }
}

fn upstream_error(failure: UpstreamFailure) -> ExecError {
    ExecError::Upstream {
        status: failure.status,
        body: failure.body,
    }
}
