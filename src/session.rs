//! Session lifecycle management for the streamable HTTP transport.
//!
//! The manager exclusively owns the table of live sessions; no other
//! component reads or mutates it. Every entry binds one transport to one
//! tool server, created together on a valid initialization request and
//! destroyed together on transport closure, idle eviction, or shutdown.
//! Identifiers are generated before any asynchronous work begins and are
//! never reused: a stale identifier is a client error, not a re-creation.

use crate::transport::{SessionTransport, TransportFactory, is_initialize_request};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Sessions idle longer than this are evicted by the sweep.
pub const SESSION_IDLE_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// Interval between idle sweeps.
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Session-routing errors, surfaced as protocol-level 400 responses rather
/// than tool-error results.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The request carried an identifier this process never issued, or one
    /// whose session has already been destroyed.
    #[error("Unknown session: {0}")]
    UnknownSession(String),

    /// The request carried no identifier and is not a valid initialization
    /// request.
    #[error("Bad Request: No valid session ID provided")]
    BadInitialization,
}

struct SessionEntry {
    transport: Arc<dyn SessionTransport>,
    last_activity: Instant,
}

/// Owner of all live protocol sessions, keyed by generated identifier.
pub struct SessionManager {
    sessions: Mutex<HashMap<String, SessionEntry>>,
    factory: TransportFactory,
    idle_timeout: Duration,
}

impl SessionManager {
    /// Create a manager with the production idle timeout.
    pub fn new(factory: TransportFactory) -> Self {
        Self::with_idle_timeout(factory, SESSION_IDLE_TIMEOUT)
    }

    /// Create a manager with a custom idle timeout.
    pub fn with_idle_timeout(factory: TransportFactory, idle_timeout: Duration) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            factory,
            idle_timeout,
        }
    }

    /// Create a session for a well-formed initialization request and route
    /// the request to its fresh transport.
    ///
    /// The identifier is generated and the record registered before the
    /// message is handed to the transport, so a near-simultaneous second
    /// initialization can never observe a half-registered session.
    pub async fn initialize(
        &self,
        message: Value,
    ) -> Result<(String, Option<Value>), SessionError> {
        if !is_initialize_request(&message) {
            return Err(SessionError::BadInitialization);
        }

        let session_id = Uuid::new_v4().to_string();
        let transport = (self.factory)();

        {
            let mut sessions = self.sessions.lock().await;
            sessions.insert(
                session_id.clone(),
                SessionEntry {
                    transport: Arc::clone(&transport),
                    last_activity: Instant::now(),
                },
            );
        }
        info!(session_id = %session_id, "Session initialized");

        let response = transport.handle_request(message).await;
        Ok((session_id, response))
    }

    /// Route a request to an existing session, refreshing its activity
    /// timestamp.
    pub async fn handle(
        &self,
        session_id: &str,
        message: Value,
    ) -> Result<Option<Value>, SessionError> {
        let transport = {
            let mut sessions = self.sessions.lock().await;
            let entry = sessions
                .get_mut(session_id)
                .ok_or_else(|| SessionError::UnknownSession(session_id.to_string()))?;
            entry.last_activity = Instant::now();
            Arc::clone(&entry.transport)
        };

        debug!(session_id = %session_id, "Routing request to session");
        Ok(transport.handle_request(message).await)
    }

    /// Refresh a session's activity timestamp without routing a message.
    pub async fn touch(&self, session_id: &str) -> Result<(), SessionError> {
        let mut sessions = self.sessions.lock().await;
        let entry = sessions
            .get_mut(session_id)
            .ok_or_else(|| SessionError::UnknownSession(session_id.to_string()))?;
        entry.last_activity = Instant::now();
        Ok(())
    }

    /// Close a session and remove its record. Idempotent: closing an
    /// unknown or already-removed session is a no-op returning false.
    pub async fn close(&self, session_id: &str) -> bool {
        let entry = {
            let mut sessions = self.sessions.lock().await;
            sessions.remove(session_id)
        };

        match entry {
            Some(entry) => {
                info!(session_id = %session_id, "Closing session");
                entry.transport.close().await;
                true
            }
            None => false,
        }
    }

    /// Evict every session idle longer than the configured threshold,
    /// returning the number evicted. A failure to close one transport does
    /// not stop the sweep for the others.
    pub async fn sweep_idle(&self) -> usize {
        let stale: Vec<(String, Arc<dyn SessionTransport>)> = {
            let mut sessions = self.sessions.lock().await;
            let stale_ids: Vec<String> = sessions
                .iter()
                .filter(|(_, entry)| entry.last_activity.elapsed() > self.idle_timeout)
                .map(|(id, _)| id.clone())
                .collect();
            stale_ids
                .into_iter()
                .filter_map(|id| sessions.remove(&id).map(|entry| (id, entry.transport)))
                .collect()
        };

        for (session_id, transport) in &stale {
            info!(session_id = %session_id, "Evicting idle session");
            transport.close().await;
        }
        stale.len()
    }

    /// Close and remove every session, in preparation for process exit.
    pub async fn shutdown(&self) {
        let drained: Vec<(String, SessionEntry)> = {
            let mut sessions = self.sessions.lock().await;
            sessions.drain().collect()
        };

        for (session_id, entry) in drained {
            info!(session_id = %session_id, "Closing session for shutdown");
            entry.transport.close().await;
        }
        info!("All sessions drained");
    }

    /// Number of live sessions.
    pub async fn session_count(&self) -> usize {
        self.sessions.lock().await.len()
    }

    /// Spawn the periodic idle sweep.
    pub fn spawn_idle_sweeper(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await; // the first tick fires immediately
            loop {
                ticker.tick().await;
                let evicted = manager.sweep_idle().await;
                if evicted > 0 {
                    info!(evicted, "Idle sweep evicted sessions");
                } else {
                    debug!("Idle sweep found nothing to evict");
                }
            }
        })
    }
}

impl Drop for SessionManager {
    fn drop(&mut self) {
        let remaining = self.sessions.get_mut().len();
        if remaining > 0 {
            warn!(remaining, "Session manager dropped with live sessions");
        }
    }
}
