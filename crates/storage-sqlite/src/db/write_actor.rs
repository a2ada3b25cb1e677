//! Single-writer actor.
//!
//! SQLite allows one writer at a time. Funneling all writes through one
//! dedicated thread avoids `SQLITE_BUSY` between pooled connections and gives
//! every job its own `BEGIN IMMEDIATE` transaction.

use std::any::Any;

use diesel::sqlite::SqliteConnection;
use log::{debug, error};
use tokio::sync::{mpsc, oneshot};

use northstar_core::errors::{DatabaseError, Error, Result};

use super::DbPool;
use crate::errors::StorageError;

const WRITE_QUEUE_CAPACITY: usize = 1024;

type AnyResult = Result<Box<dyn Any + Send>>;
type Job = Box<dyn FnOnce(&mut SqliteConnection) -> AnyResult + Send>;

struct WriteRequest {
    job: Job,
    reply: oneshot::Sender<AnyResult>,
}

/// Either the job failed or the transaction around it did.
enum TxError {
    Diesel(diesel::result::Error),
    Job(Error),
}

impl From<diesel::result::Error> for TxError {
    fn from(err: diesel::result::Error) -> Self {
        Self::Diesel(err)
    }
}

impl From<TxError> for Error {
    fn from(err: TxError) -> Self {
        match err {
            TxError::Diesel(e) => StorageError::from(e).into(),
            TxError::Job(e) => e,
        }
    }
}

#[derive(Clone)]
pub struct WriteHandle {
    tx: mpsc::Sender<WriteRequest>,
}

impl WriteHandle {
    /// Runs `job` on the writer connection inside one transaction.
    pub async fn exec<F, T>(&self, job: F) -> Result<T>
    where
        F: FnOnce(&mut SqliteConnection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let (reply, response) = oneshot::channel();
        let job: Job = Box::new(move |conn| {
            job(conn).map(|value| Box::new(value) as Box<dyn Any + Send>)
        });

        self.tx
            .send(WriteRequest { job, reply })
            .await
            .map_err(|_| writer_gone())?;

        let value = response.await.map_err(|_| writer_gone())??;
        value.downcast::<T>().map(|boxed| *boxed).map_err(|_| {
            Error::Database(DatabaseError::Internal(
                "Writer returned an unexpected result type".to_string(),
            ))
        })
    }
}

fn writer_gone() -> Error {
    Error::Database(DatabaseError::Internal(
        "Database writer is not running".to_string(),
    ))
}

/// Starts the writer thread. It stops once every [`WriteHandle`] is dropped.
pub fn spawn_writer(pool: DbPool) -> WriteHandle {
    let (tx, mut rx) = mpsc::channel::<WriteRequest>(WRITE_QUEUE_CAPACITY);

    std::thread::spawn(move || {
        let mut conn = None;
        while let Some(WriteRequest { job, reply }) = rx.blocking_recv() {
            if conn.is_none() {
                match pool.get() {
                    Ok(acquired) => conn = Some(acquired),
                    Err(e) => {
                        error!("[Storage] Writer could not acquire a connection: {}", e);
                        let _ = reply.send(Err(StorageError::from(e).into()));
                        continue;
                    }
                }
            }
            let Some(conn) = conn.as_mut() else {
                continue;
            };

            let result = conn
                .immediate_transaction(|tx_conn| job(tx_conn).map_err(TxError::Job))
                .map_err(Error::from);
            if reply.send(result).is_err() {
                debug!("[Storage] Write caller went away before the result was delivered");
            }
        }
        debug!("[Storage] Writer stopped");
    });

    WriteHandle { tx }
}
