//! Cross-session bookkeeping: the live session table and notification
//! fan-out for resource updates and list changes.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use mcp_types::ModelContextProtocolNotification;
use mcp_types::PromptListChangedNotification;
use mcp_types::ResourceListChangedNotification;
use mcp_types::ResourceUpdatedNotification;
use mcp_types::ResourceUpdatedNotificationParams;
use mcp_types::ToolListChangedNotification;
use serde_json::json;
use tokio::sync::Mutex;
use tracing::warn;

use crate::session::Session;
use crate::session::SessionState;

/// Registry of every live session on this server. Fan-out to subscribers is
/// best-effort: a session whose outbound queue is saturated misses the
/// notification and the drop counter is bumped; the notifier never blocks.
#[derive(Default)]
pub struct SessionManager {
    sessions: Mutex<HashMap<String, Arc<Session>>>,
    dropped_updates: AtomicU64,
}

impl SessionManager {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub async fn register(&self, session: Arc<Session>) {
        let mut sessions = self.sessions.lock().await;
        if let Some(previous) = sessions.insert(session.session_id().to_string(), session) {
            warn!(
                "replaced an existing session with id {}",
                previous.session_id()
            );
        }
    }

    pub async fn get(&self, session_id: &str) -> Option<Arc<Session>> {
        self.sessions.lock().await.get(session_id).cloned()
    }

    /// Unregister and tear down one session.
    pub async fn remove(&self, session_id: &str) -> Option<Arc<Session>> {
        let session = self.sessions.lock().await.remove(session_id);
        if let Some(session) = &session {
            session.close().await;
        }
        session
    }

    pub async fn close_all(&self) {
        let sessions: Vec<Arc<Session>> = {
            let mut map = self.sessions.lock().await;
            map.drain().map(|(_, s)| s).collect()
        };
        for session in sessions {
            session.close().await;
        }
    }

    /// The application mutated `uri`: tell every subscribed session.
    /// Returns the number of sessions actually reached.
    pub async fn notify_resource_updated(&self, uri: &str) -> usize {
        let sessions: Vec<Arc<Session>> = {
            let map = self.sessions.lock().await;
            map.values().cloned().collect()
        };

        let mut delivered = 0;
        for session in sessions {
            if session.state().await != SessionState::Operational {
                continue;
            }
            if !session.is_subscribed(uri).await {
                continue;
            }
            let params = ResourceUpdatedNotificationParams {
                uri: uri.to_string(),
            };
            let params = match serde_json::to_value(&params) {
                Ok(params) => params,
                Err(err) => {
                    warn!("failed to serialize resources/updated params: {err}");
                    continue;
                }
            };
            if session
                .outgoing()
                .try_send_notification(ResourceUpdatedNotification::METHOD, Some(params))
            {
                delivered += 1;
            } else {
                self.dropped_updates.fetch_add(1, Ordering::Relaxed);
            }
        }
        delivered
    }

    pub async fn notify_resource_list_changed(&self) {
        self.broadcast(ResourceListChangedNotification::METHOD).await;
    }

    pub async fn notify_tool_list_changed(&self) {
        self.broadcast(ToolListChangedNotification::METHOD).await;
    }

    pub async fn notify_prompt_list_changed(&self) {
        self.broadcast(PromptListChangedNotification::METHOD).await;
    }

    /// Notifications dropped because a subscriber's queue was full.
    pub fn dropped_updates(&self) -> u64 {
        self.dropped_updates.load(Ordering::Relaxed)
    }

    async fn broadcast(&self, method: &str) {
        let sessions: Vec<Arc<Session>> = {
            let map = self.sessions.lock().await;
            map.values().cloned().collect()
        };
        for session in sessions {
            if session.state().await != SessionState::Operational {
                continue;
            }
            session
                .outgoing()
                .send_notification(method, Some(json!({})))
                .await;
        }
    }
}
