//! Thread-safe client pool with single-flight connection establishment.
//!
//! One logical client per server identifier. Live clients sit in a bounded
//! LRU; eviction closes the client and drops its cached tool listing. The
//! per-key connect gate guarantees at most one concurrent connect per server
//! identifier, and the gate is released before any tool RPC is issued.

use std::{num::NonZeroUsize, sync::Arc};

use dashmap::DashMap;
use lru::LruCache;
use parking_lot::Mutex;
use serde_json::Value;
use tracing::{debug, warn};

use crate::{
    client::{self, McpClient, McpToolDef},
    config::ServerSpec,
    error::{McpError, McpResult},
};

const DEFAULT_MAX_CONNECTIONS: usize = 200;

pub struct McpClientPool {
    /// Live clients keyed by server identifier, LRU-bounded.
    clients: Mutex<LruCache<String, Arc<McpClient>>>,
    /// Per-key connect gates for single-flight creation.
    connect_gates: DashMap<String, Arc<tokio::sync::Mutex<()>>>,
    /// Cached tool listings keyed by server identifier.
    listings: DashMap<String, Arc<Vec<McpToolDef>>>,
    capacity: usize,
}

impl McpClientPool {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_MAX_CONNECTIONS)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            clients: Mutex::new(LruCache::new(
                NonZeroUsize::new(capacity.max(1)).expect("capacity is at least 1"),
            )),
            connect_gates: DashMap::new(),
            listings: DashMap::new(),
            capacity: capacity.max(1),
        }
    }

    /// Get the existing client for `spec` or connect a new one.
    ///
    /// Single-flight per server identifier: concurrent callers for the same
    /// key wait on the gate, then find the first caller's client.
    pub async fn get_or_connect(&self, spec: &ServerSpec) -> McpResult<Arc<McpClient>> {
        let key = spec.server_key();

        if let Some(client) = self.clients.lock().get(&key) {
            return Ok(Arc::clone(client));
        }

        let gate = self
            .connect_gates
            .entry(key.clone())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone();
        let _guard = gate.lock().await;

        // A concurrent caller may have connected while we waited on the gate.
        if let Some(client) = self.clients.lock().get(&key) {
            return Ok(Arc::clone(client));
        }

        let client = Arc::new(client::connect(spec).await?);

        let evicted = {
            let mut clients = self.clients.lock();
            clients.push(key.clone(), Arc::clone(&client))
        };
        if let Some((evicted_key, evicted_client)) = evicted {
            if evicted_key != key {
                debug!("LRU evicted MCP server '{}'", evicted_key);
                self.drop_server(&evicted_key, evicted_client);
            }
        }

        Ok(client)
    }

    /// List tools for a server, caching the listing per server identifier.
    ///
    /// A transient listing failure is retried once against a fresh read of
    /// the pool.
    pub async fn list_tools(&self, spec: &ServerSpec) -> McpResult<Arc<Vec<McpToolDef>>> {
        let key = spec.server_key();
        if let Some(cached) = self.listings.get(&key) {
            return Ok(Arc::clone(cached.value()));
        }

        let client = self.get_or_connect(spec).await?;
        let tools = match client::list_tools(&client, &spec.label).await {
            Ok(tools) => tools,
            Err(first_err) => {
                warn!(
                    "list_tools on '{}' failed, retrying once: {}",
                    spec.label, first_err
                );
                client::list_tools(&client, &spec.label).await?
            }
        };

        let tools = Arc::new(tools);
        self.listings.insert(key, Arc::clone(&tools));
        Ok(tools)
    }

    /// Execute a tool by raw name on the server identified by `spec`.
    pub async fn execute(
        &self,
        spec: &ServerSpec,
        tool_name: &str,
        arguments: Value,
    ) -> McpResult<String> {
        let client = self.get_or_connect(spec).await?;
        client::call_tool(&client, tool_name, arguments).await
    }

    /// Whether the server's listing contains a tool named `tool_name`.
    pub fn has_cached_tool(&self, server_key: &str, tool_name: &str) -> bool {
        self.listings
            .get(server_key)
            .is_some_and(|tools| tools.iter().any(|t| t.name == tool_name))
    }

    /// Drop a server's client and cached listing.
    pub fn disconnect(&self, server_key: &str) {
        let removed = self.clients.lock().pop(server_key);
        if let Some(client) = removed {
            self.drop_server(server_key, client);
        } else {
            self.listings.remove(server_key);
        }
    }

    fn drop_server(&self, server_key: &str, client: Arc<McpClient>) {
        self.listings.remove(server_key);
        self.connect_gates.remove(server_key);
        match Arc::try_unwrap(client) {
            Ok(client) => {
                if let Ok(handle) = tokio::runtime::Handle::try_current() {
                    handle.spawn(async move {
                        if let Err(err) = client.cancel().await {
                            warn!("Error closing MCP client: {}", err);
                        }
                    });
                }
            }
            Err(_) => {
                debug!(
                    "MCP client for '{}' still referenced, closing on last drop",
                    server_key
                );
            }
        }
    }

    /// Close every connection. Called on process shutdown.
    pub async fn shutdown(&self) {
        let drained: Vec<(String, Arc<McpClient>)> = {
            let mut clients = self.clients.lock();
            let mut drained = Vec::with_capacity(clients.len());
            while let Some(entry) = clients.pop_lru() {
                drained.push(entry);
            }
            drained
        };

        for (key, client) in drained {
            self.listings.remove(&key);
            match Arc::try_unwrap(client) {
                Ok(client) => {
                    if let Err(err) = client.cancel().await {
                        warn!("Error disconnecting from '{}': {}", key, err);
                    }
                }
                Err(_) => {
                    warn!("Could not shut down '{}': client still in use", key);
                }
            }
        }
        self.connect_gates.clear();
    }

    pub fn len(&self) -> usize {
        self.clients.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.lock().is_empty()
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            total_connections: self.clients.lock().len(),
            cached_listings: self.listings.len(),
            capacity: self.capacity,
        }
    }
}

impl Default for McpClientPool {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone)]
pub struct PoolStats {
    pub total_connections: usize,
    pub cached_listings: usize,
    pub capacity: usize,
}
