//! Process-wide list of live calls
//!
//! One lock guards insertion and removal. Each call sits behind its own
//! async mutex, which serializes everything done to that call.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

use crate::call::{Call, CallState};
use crate::error::{CallError, Result};

pub type CallHandle = Arc<Mutex<Call>>;

/// Snapshot of registry activity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryStats {
    pub total_created: usize,
    pub active: usize,
    pub cleared: usize,
}

#[derive(Debug, Default)]
struct Counters {
    total_created: usize,
    cleared: usize,
}

#[derive(Debug, Clone, Default)]
pub struct CallRegistry {
    calls: Arc<RwLock<HashMap<String, CallHandle>>>,
    counters: Arc<RwLock<Counters>>,
}

impl CallRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a call under its token
    pub async fn insert(&self, call: Call) -> Result<CallHandle> {
        let token = call.token().to_string();
        let mut calls = self.calls.write().await;
        if calls.contains_key(&token) {
            return Err(CallError::DuplicateCall(token));
        }
        let handle = Arc::new(Mutex::new(call));
        calls.insert(token.clone(), Arc::clone(&handle));
        self.counters.write().await.total_created += 1;
        debug!(%token, "call registered");
        Ok(handle)
    }

    pub async fn get(&self, token: &str) -> Option<CallHandle> {
        self.calls.read().await.get(token).cloned()
    }

    pub async fn contains(&self, token: &str) -> bool {
        self.calls.read().await.contains_key(token)
    }

    pub async fn remove(&self, token: &str) -> Option<CallHandle> {
        let removed = self.calls.write().await.remove(token);
        if removed.is_some() {
            self.counters.write().await.cleared += 1;
            debug!(token, "call unregistered");
        }
        removed
    }

    pub async fn tokens(&self) -> Vec<String> {
        self.calls.read().await.keys().cloned().collect()
    }

    pub async fn handles(&self) -> Vec<(String, CallHandle)> {
        self.calls
            .read()
            .await
            .iter()
            .map(|(token, handle)| (token.clone(), Arc::clone(handle)))
            .collect()
    }

    /// Tokens of calls currently in `state`
    ///
    /// Calls busy under their own lock are skipped.
    pub async fn tokens_in_state(&self, state: CallState) -> Vec<String> {
        let mut found = Vec::new();
        for (token, handle) in self.handles().await {
            if let Ok(call) = handle.try_lock() {
                if call.state() == state {
                    found.push(token);
                }
            }
        }
        found
    }

    pub async fn len(&self) -> usize {
        self.calls.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.calls.read().await.is_empty()
    }

    pub async fn stats(&self) -> RegistryStats {
        let active = self.calls.read().await.len();
        let counters = self.counters.read().await;
        RegistryStats {
            total_created: counters.total_created,
            active,
            cleared: counters.cleared,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::call::CallDirection;
    use crate::config::EndpointDefaults;
    use crate::context::EndpointContext;

    fn call(token: &str) -> Call {
        let ctx = Arc::new(EndpointContext::new(EndpointDefaults::default()).unwrap());
        Call::new(ctx, token, CallDirection::Outgoing)
    }

    #[tokio::test]
    async fn test_insert_and_remove() {
        let registry = CallRegistry::new();
        registry.insert(call("a")).await.unwrap();
        registry.insert(call("b")).await.unwrap();
        assert!(registry.contains("a").await);

        registry.remove("a").await;
        let stats = registry.stats().await;
        assert_eq!(stats, RegistryStats { total_created: 2, active: 1, cleared: 1 });
    }

    #[tokio::test]
    async fn test_duplicate_token_rejected() {
        let registry = CallRegistry::new();
        registry.insert(call("dup")).await.unwrap();
        let err = registry.insert(call("dup")).await.unwrap_err();
        assert!(matches!(err, CallError::DuplicateCall(t) if t == "dup"));
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn test_tokens_in_state() {
        let registry = CallRegistry::new();
        let handle = registry.insert(call("x")).await.unwrap();
        handle.lock().await.mark_for_clearing(crate::cause::CallClearReason::LocalCleared, None);
        registry.insert(call("y")).await.unwrap();
        assert_eq!(registry.tokens_in_state(CallState::Clear).await, vec!["x".to_string()]);
    }
}
