//! Connections to the services inbox-todo depends on.
//!
//! The gateway opens one connection per configured service into a
//! `ConnectionPool`, then blocks on the `ReadinessGate` until all of them
//! report serving. Typed clients are looked up from the pool by name.

pub mod clients;
pub mod connection;
pub mod pool;
pub mod readiness;

#[cfg(test)]
pub(crate) mod testing;

pub use clients::{DatabaseClient, SummaryClient, TodoClient, TodoTask};
pub use connection::{
    Connection, Connector, HttpConnection, HttpConnector, ServiceConfig, ServingStatus,
    normalize_addr,
};
pub use pool::ConnectionPool;
pub use readiness::{DEFAULT_POLL_INTERVAL, HealthOutcome, ReadinessGate};
