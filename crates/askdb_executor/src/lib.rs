mod convert;
mod executor;
mod pool;

pub use convert::row_to_json;
pub use executor::{PgExecutor, classify_pg_error};
pub use pool::{PgPool, PooledClient};
