//! Bounded connection pool.
//!
//! Connections are leased for the duration of one operation and returned on
//! drop. A semaphore bounds the total; broken connections are discarded and
//! replaced lazily.

use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Mutex};

use askdb_core::{DbErrorInfo, DbFailure, EngineError};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_postgres::{Client, NoTls};

pub struct PgPool {
    conn_str: String,
    permits: Arc<Semaphore>,
    idle: Arc<Mutex<Vec<Client>>>,
}

impl PgPool {
    pub fn new(conn_str: &str, size: usize) -> Self {
        Self {
            conn_str: conn_str.to_string(),
            permits: Arc::new(Semaphore::new(size.max(1))),
            idle: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Lease a connection, waiting for a slot if the pool is exhausted.
    pub async fn lease(&self) -> Result<PooledClient, EngineError> {
        let permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| EngineError::internal("connection pool closed"))?;

        let reusable = {
            let mut idle = self
                .idle
                .lock()
                .map_err(|e| EngineError::internal(format!("pool lock failed: {e}")))?;
            loop {
                match idle.pop() {
                    Some(client) if client.is_closed() => continue,
                    other => break other,
                }
            }
        };

        let client = match reusable {
            Some(client) => client,
            None => connect(&self.conn_str).await?,
        };

        Ok(PooledClient {
            client: Some(client),
            idle: Arc::clone(&self.idle),
            _permit: permit,
        })
    }
}

async fn connect(conn_str: &str) -> Result<Client, EngineError> {
    let (client, connection) = tokio_postgres::connect(conn_str, NoTls)
        .await
        .map_err(connection_error)?;

    tokio::spawn(async move {
        if let Err(e) = connection.await {
            log::warn!("database connection task ended: {e}");
        }
    });

    Ok(client)
}

fn connection_error(err: tokio_postgres::Error) -> EngineError {
    EngineError::Database(DbFailure::new(DbErrorInfo::new(format!(
        "connection failed: {err}"
    ))))
}

/// A leased connection; returns to the pool when dropped.
pub struct PooledClient {
    client: Option<Client>,
    idle: Arc<Mutex<Vec<Client>>>,
    _permit: OwnedSemaphorePermit,
}

impl Deref for PooledClient {
    type Target = Client;

    fn deref(&self) -> &Client {
        self.client.as_ref().expect("client present until drop")
    }
}

impl DerefMut for PooledClient {
    fn deref_mut(&mut self) -> &mut Client {
        self.client.as_mut().expect("client present until drop")
    }
}

impl Drop for PooledClient {
    fn drop(&mut self) {
        if let Some(client) = self.client.take()
            && !client.is_closed()
            && let Ok(mut idle) = self.idle.lock()
        {
            idle.push(client);
        }
    }
}
