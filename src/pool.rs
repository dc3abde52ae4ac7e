//! Connection pool: a role-parameterized, per-peer-address cache of
//! stream-oriented connections. Egress dials on a cache miss; ingress is
//! populated only by the listener and never dials. Grounded on
//! `original_source/paxos/network/connection.go`'s `ConnectionPool`.

use std::{collections::HashMap, sync::Arc};
use tokio::{
    net::TcpStream,
    sync::Mutex,
};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PoolRole {
    Ingress,
    Egress,
}

/// A cached connection, shared so a writer and a "remove on error" caller
/// can both hold a handle to the same stream.
pub type Connection = Arc<Mutex<TcpStream>>;

pub struct ConnectionPool {
    role: PoolRole,
    port: u16,
    connections: Mutex<HashMap<String, Connection>>,
}

impl ConnectionPool {
    #[must_use]
    pub fn new(role: PoolRole, port: u16) -> Self {
        Self {
            role,
            port,
            connections: Mutex::new(HashMap::new()),
        }
    }

    /// Return the cached connection for `addr`, or for an egress pool, dial
    /// one, cache it, and return it. An ingress pool never dials: a miss is
    /// an error (the listener hasn't registered that peer's stream yet, or
    /// it has since closed).
    pub async fn get(&self, addr: &str) -> std::io::Result<Connection> {
        if let Some(conn) = self.connections.lock().await.get(addr).cloned() {
            return Ok(conn);
        }

        match self.role {
            PoolRole::Ingress => Err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("no ingress connection registered for {addr}"),
            )),
            PoolRole::Egress => {
                let stream = TcpStream::connect((addr, self.port)).await?;
                let conn = Arc::new(Mutex::new(stream));
                self.connections
                    .lock()
                    .await
                    .insert(addr.to_string(), conn.clone());
                Ok(conn)
            }
        }
    }

    /// Register a connection under `addr`, overwriting any existing entry.
    /// Used by the ingress listener for each accepted stream, and may also
    /// be used to seed an egress connection (e.g. in tests).
    pub async fn insert(&self, addr: String, stream: TcpStream) -> Connection {
        let conn = Arc::new(Mutex::new(stream));
        self.connections.lock().await.insert(addr, conn.clone());
        conn
    }

    /// Explicitly drop the cached connection for `addr`, so the next
    /// `get`/write attempt redials (egress) or waits for a fresh accept
    /// (ingress).
    pub async fn remove(&self, addr: &str) {
        self.connections.lock().await.remove(addr);
    }
}

#[cfg(test)]
mod tests {
    use super::{ConnectionPool, PoolRole};

    #[tokio::test]
    async fn ingress_get_on_miss_errors_without_dialing() {
        let pool = ConnectionPool::new(PoolRole::Ingress, 8080);
        let result = pool.get("nonexistent-host").await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn egress_get_caches_after_first_dial() {
        // Stand up a local listener to dial against, proving the
        // dial-on-miss path populates the cache (a second `get` for the
        // same address must not attempt to dial again, or the test would
        // need a second accept).
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = listener.accept().await;
        });

        let pool = ConnectionPool::new(PoolRole::Egress, addr.port());
        let first = pool.get(&addr.ip().to_string()).await.unwrap();
        let second = pool.get(&addr.ip().to_string()).await.unwrap();
        assert!(std::sync::Arc::ptr_eq(&first, &second));
    }

    #[tokio::test]
    async fn remove_evicts_cached_entry() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            loop {
                if listener.accept().await.is_err() {
                    break;
                }
            }
        });

        let pool = ConnectionPool::new(PoolRole::Egress, addr.port());
        let host = addr.ip().to_string();
        let first = pool.get(&host).await.unwrap();
        pool.remove(&host).await;
        let second = pool.get(&host).await.unwrap();
        assert!(!std::sync::Arc::ptr_eq(&first, &second));
    }
}
