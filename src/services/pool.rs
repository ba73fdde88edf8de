//! Named pool of long-lived service connections.

use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::{debug, info};

use crate::error::ServiceError;
use crate::services::connection::{Connection, Connector, ServiceConfig};

struct ServiceConnection {
    connection: Arc<dyn Connection>,
    client: Arc<dyn Any + Send + Sync>,
}

/// Owns one connection (and its typed client) per configured service.
///
/// Every connection is closed exactly once: by `close()` or, failing that,
/// when the pool is dropped.
pub struct ConnectionPool {
    services: RwLock<HashMap<String, ServiceConnection>>,
}

impl ConnectionPool {
    /// Create a pool with no connections.
    pub fn empty() -> Self {
        Self {
            services: RwLock::new(HashMap::new()),
        }
    }

    /// Open a connection for every config. If any fails, the connections
    /// already opened in this batch are closed before the error is returned.
    pub fn build(configs: &[ServiceConfig], connector: &dyn Connector) -> Result<Self, ServiceError> {
        let pool = Self::empty();

        for config in configs {
            if pool.read().contains_key(&config.name) {
                pool.close();
                return Err(ServiceError::ConnectFailed {
                    name: config.name.clone(),
                    addr: config.addr.clone(),
                    reason: "duplicate service name".to_string(),
                });
            }

            let connection = match connector.connect(&config.name, &config.addr) {
                Ok(conn) => conn,
                Err(e) => {
                    pool.close();
                    return Err(e);
                }
            };

            let client = config.build_client(Arc::clone(&connection));
            debug!(service = %config.name, addr = %config.addr, "Connection added to pool");
            pool.write().insert(
                config.name.clone(),
                ServiceConnection { connection, client },
            );
        }

        Ok(pool)
    }

    /// Typed client for `name`, if the service exists and the type matches.
    pub fn client<T: Any + Send + Sync>(&self, name: &str) -> Option<Arc<T>> {
        let services = self.read();
        let service = services.get(name)?;
        Arc::clone(&service.client).downcast::<T>().ok()
    }

    /// Like [`client`](Self::client) but with an error naming the service.
    pub fn require_client<T: Any + Send + Sync>(&self, name: &str) -> Result<Arc<T>, ServiceError> {
        self.client(name).ok_or_else(|| ServiceError::NotConfigured {
            name: name.to_string(),
        })
    }

    /// Raw connection for `name`.
    pub fn connection(&self, name: &str) -> Option<Arc<dyn Connection>> {
        self.read().get(name).map(|s| Arc::clone(&s.connection))
    }

    /// Snapshot of all connections, sorted by service name.
    pub fn connections(&self) -> Vec<(String, Arc<dyn Connection>)> {
        let mut all: Vec<_> = self
            .read()
            .iter()
            .map(|(name, s)| (name.clone(), Arc::clone(&s.connection)))
            .collect();
        all.sort_by(|a, b| a.0.cmp(&b.0));
        all
    }

    /// Names of all pooled services, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Number of pooled services.
    pub fn len(&self) -> usize {
        self.read().len()
    }

    /// Whether the pool holds no services.
    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Close every connection. Safe to call repeatedly and on an empty pool.
    pub fn close(&self) {
        let drained = std::mem::take(&mut *self.write());
        if drained.is_empty() {
            return;
        }
        let count = drained.len();
        for (name, service) in drained {
            service.connection.close();
            debug!(service = %name, "Connection closed");
        }
        info!(count, "Closed service connections");
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, ServiceConnection>> {
        self.services.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, ServiceConnection>> {
        self.services.write().unwrap_or_else(|e| e.into_inner())
    }
}

impl Drop for ConnectionPool {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use super::*;
    use crate::services::connection::ServingStatus;
    use crate::services::testing::{Behavior, MockConnection, MockConnector};

    struct NameClient(String);

    fn config(name: &str) -> ServiceConfig {
        ServiceConfig::new(name, format!("{name}.internal:1"), |conn: Arc<dyn Connection>| {
            NameClient(conn.name().to_string())
        })
    }

    fn serving(name: &str) -> Arc<MockConnection> {
        MockConnection::new(name, Behavior::Always(ServingStatus::Serving))
    }

    #[test]
    fn build_and_lookup() {
        let llm = serving("llm");
        let todo = serving("todo");
        let connector = MockConnector::default().with(llm.clone()).with(todo.clone());

        let pool = ConnectionPool::build(&[config("llm"), config("todo")], &connector).unwrap();

        assert_eq!(pool.len(), 2);
        assert_eq!(pool.names(), vec!["llm", "todo"]);
        assert_eq!(pool.client::<NameClient>("todo").unwrap().0, "todo");
        assert_eq!(pool.connection("llm").unwrap().name(), "llm");
        assert!(pool.client::<NameClient>("database").is_none());
        assert!(matches!(
            pool.require_client::<NameClient>("database"),
            Err(ServiceError::NotConfigured { .. })
        ));
    }

    #[test]
    fn lookup_with_wrong_type_is_none() {
        let connector = MockConnector::default().with(serving("llm"));
        let pool = ConnectionPool::build(&[config("llm")], &connector).unwrap();
        assert!(pool.client::<String>("llm").is_none());
    }

    #[test]
    fn failed_build_closes_opened_connections() {
        let llm = serving("llm");
        let todo = serving("todo");
        let connector = MockConnector::default().with(llm.clone()).with(todo.clone());

        let err = ConnectionPool::build(
            &[config("llm"), config("todo"), config("database")],
            &connector,
        )
        .err()
        .unwrap();

        assert!(matches!(err, ServiceError::ConnectFailed { ref name, .. } if name == "database"));
        assert_eq!(llm.closes.load(Ordering::SeqCst), 1);
        assert_eq!(todo.closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn duplicate_names_rejected() {
        let llm = serving("llm");
        let connector = MockConnector::default().with(llm.clone());

        let err = ConnectionPool::build(&[config("llm"), config("llm")], &connector)
            .err()
            .unwrap();

        assert!(err.to_string().contains("duplicate"));
        assert_eq!(llm.closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn close_is_idempotent() {
        let llm = serving("llm");
        let connector = MockConnector::default().with(llm.clone());
        let pool = ConnectionPool::build(&[config("llm")], &connector).unwrap();

        pool.close();
        pool.close();
        drop(pool);

        assert_eq!(llm.closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn drop_closes_connections() {
        let llm = serving("llm");
        let connector = MockConnector::default().with(llm.clone());
        {
            let _pool = ConnectionPool::build(&[config("llm")], &connector).unwrap();
        }
        assert_eq!(llm.closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn close_empty_pool() {
        let pool = ConnectionPool::empty();
        pool.close();
        assert!(pool.is_empty());
        assert!(pool.connections().is_empty());
    }

    #[test]
    fn lookups_after_close_are_empty() {
        let connector = MockConnector::default().with(serving("llm"));
        let pool = ConnectionPool::build(&[config("llm")], &connector).unwrap();
        pool.close();
        assert!(pool.client::<NameClient>("llm").is_none());
        assert!(pool.connection("llm").is_none());
    }
}
