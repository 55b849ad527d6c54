//! PostgreSQL collaborators: connection pooling, schema introspection and
//! read-only query execution.

pub mod connection;
pub mod executor;
pub mod introspect;

pub use connection::init_pool;
pub use executor::{PgExecutor, QueryExecutor, QueryResult};
pub use introspect::introspect_catalog;
