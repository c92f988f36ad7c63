//! Read-mostly agent configuration cache over an external store.

use async_trait::async_trait;
use maestro_core::{AgentConfig, MaestroResult};
use parking_lot::RwLock as SyncRwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Source of truth for agent definitions. The engine never writes to it.
#[async_trait]
pub trait AgentStore: Send + Sync {
    /// One agent by id.
    async fn get_by_id(&self, id: &str) -> MaestroResult<Option<AgentConfig>>;

    /// Every agent.
    async fn list_all(&self) -> MaestroResult<Vec<AgentConfig>>;
}

/// Store backed by a vector in memory. The CLI fills it from `maestro.toml`.
#[derive(Debug, Default)]
pub struct InMemoryAgentStore {
    agents: SyncRwLock<Vec<AgentConfig>>,
}

impl InMemoryAgentStore {
    /// Store seeded with `agents`.
    pub fn new(agents: Vec<AgentConfig>) -> Self {
        Self {
            agents: SyncRwLock::new(agents),
        }
    }

    /// Swap in a new set of agents.
    pub fn replace_all(&self, agents: Vec<AgentConfig>) {
        *self.agents.write() = agents;
    }

    /// Number of stored agents.
    pub fn len(&self) -> usize {
        self.agents.read().len()
    }

    /// True when no agents are stored.
    pub fn is_empty(&self) -> bool {
        self.agents.read().is_empty()
    }
}

#[async_trait]
impl AgentStore for InMemoryAgentStore {
    async fn get_by_id(&self, id: &str) -> MaestroResult<Option<AgentConfig>> {
        Ok(self.agents.read().iter().find(|a| a.id == id).cloned())
    }

    async fn list_all(&self) -> MaestroResult<Vec<AgentConfig>> {
        Ok(self.agents.read().clone())
    }
}

/// Id-keyed cache of agent configurations.
///
/// Misses fall through to the store. [`refresh`](Self::refresh) replaces the
/// whole map at once; there is no per-entry invalidation.
pub struct AgentConfigCache {
    store: Arc<dyn AgentStore>,
    entries: RwLock<HashMap<String, AgentConfig>>,
}

impl AgentConfigCache {
    /// Empty cache over `store`; call `refresh` to warm it.
    pub fn new(store: Arc<dyn AgentStore>) -> Self {
        Self {
            store,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Look up one agent, fetching from the store on a miss.
    pub async fn resolve(&self, id: &str) -> MaestroResult<Option<AgentConfig>> {
        if let Some(agent) = self.entries.read().await.get(id) {
            return Ok(Some(agent.clone()));
        }
        let fetched = self.store.get_by_id(id).await?;
        if let Some(agent) = &fetched {
            debug!(agent_id = %id, "Agent config cached");
            self.entries
                .write()
                .await
                .insert(agent.id.clone(), agent.clone());
        }
        Ok(fetched)
    }

    /// Resolve several ids in order. Unknown ids are logged and skipped.
    pub async fn resolve_many(&self, ids: &[String]) -> MaestroResult<Vec<AgentConfig>> {
        let mut agents = Vec::with_capacity(ids.len());
        for id in ids {
            match self.resolve(id).await? {
                Some(agent) => agents.push(agent),
                None => warn!(agent_id = %id, "Unknown agent id, skipping"),
            }
        }
        Ok(agents)
    }

    /// Drop everything and reload from the store.
    pub async fn refresh(&self) -> MaestroResult<usize> {
        let agents = self.store.list_all().await?;
        let fresh: HashMap<String, AgentConfig> =
            agents.into_iter().map(|a| (a.id.clone(), a)).collect();
        let count = fresh.len();
        *self.entries.write().await = fresh;
        info!(count, "Agent config cache refreshed");
        Ok(count)
    }

    /// Every agent the store knows about.
    pub async fn list_all(&self) -> MaestroResult<Vec<AgentConfig>> {
        self.store.list_all().await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn store_with(ids: &[&str]) -> Arc<InMemoryAgentStore> {
        Arc::new(InMemoryAgentStore::new(
            ids.iter().map(|id| AgentConfig::new(*id, id.to_uppercase())).collect(),
        ))
    }

    #[tokio::test]
    async fn test_resolve_many_keeps_order_and_skips_unknown() {
        let cache = AgentConfigCache::new(store_with(&["a", "b", "c"]));
        let ids = vec!["c".to_string(), "zzz".to_string(), "a".to_string()];
        let agents = cache.resolve_many(&ids).await.unwrap();
        let got: Vec<_> = agents.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(got, vec!["c", "a"]);
    }

    #[tokio::test]
    async fn test_cached_entry_survives_store_change_until_refresh() {
        let store = store_with(&["a"]);
        let cache = AgentConfigCache::new(store.clone());
        assert_eq!(cache.resolve("a").await.unwrap().unwrap().name, "A");

        store.replace_all(vec![AgentConfig::new("a", "Renamed")]);
        assert_eq!(cache.resolve("a").await.unwrap().unwrap().name, "A");

        assert_eq!(cache.refresh().await.unwrap(), 1);
        assert_eq!(cache.resolve("a").await.unwrap().unwrap().name, "Renamed");
    }

    #[tokio::test]
    async fn test_refresh_drops_removed_agents() {
        let store = store_with(&["a", "b"]);
        let cache = AgentConfigCache::new(store.clone());
        cache.resolve("b").await.unwrap();
        store.replace_all(vec![AgentConfig::new("a", "A")]);
        cache.refresh().await.unwrap();
        assert!(cache.resolve("b").await.unwrap().is_none());
    }
}
