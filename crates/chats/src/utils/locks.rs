//! Keyed async mutexes.
//!
//! Lock order across the engine is workspace, then rooms sorted by id, then the
//! database writer, then a pooled connection. Nothing waits on a lock while
//! holding a connection.

use sqlx::{Sqlite, SqliteConnection, SqlitePool, Transaction};
use std::collections::HashMap;
use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

const PRUNE_THRESHOLD: usize = 1024;

#[derive(Clone, Default)]
pub struct KeyedLocks {
    inner: Arc<Mutex<HashMap<String, Arc<AsyncMutex<()>>>>>,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self, key: &str) -> OwnedMutexGuard<()> {
        let mutex = {
            let mut map = self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            if map.len() >= PRUNE_THRESHOLD {
                // Only the map holds an idle entry.
                map.retain(|_, entry| Arc::strong_count(entry) > 1);
            }
            map.entry(key.to_string()).or_default().clone()
        };
        mutex.lock_owned().await
    }

    /// Lock several keys in sorted order, skipping duplicates.
    pub async fn lock_all(&self, keys: &[String]) -> Vec<OwnedMutexGuard<()>> {
        let mut sorted: Vec<&String> = keys.iter().collect();
        sorted.sort();
        sorted.dedup();

        let mut guards = Vec::with_capacity(sorted.len());
        for key in sorted {
            guards.push(self.lock(key).await);
        }
        guards
    }

    pub fn len(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// The lock families shared by every service.
#[derive(Clone, Default)]
pub struct EngineLocks {
    pub rooms: KeyedLocks,
    pub workspaces: KeyedLocks,
    writer: Arc<AsyncMutex<()>>,
}

impl EngineLocks {
    /// Become the only writer on the database. Every write statement runs under
    /// this guard, since a deferred transaction cannot upgrade a snapshot that
    /// another writer has moved past.
    pub async fn writer(&self) -> OwnedMutexGuard<()> {
        self.writer.clone().lock_owned().await
    }

    /// Begin a transaction while holding [`Self::writer`].
    pub async fn begin_write(&self, pool: &SqlitePool) -> Result<WriteTransaction, sqlx::Error> {
        let writer = self.writer().await;
        let tx = pool.begin().await?;
        Ok(WriteTransaction { tx, writer })
    }
}

/// A transaction that keeps the writer guard until it commits or drops.
pub struct WriteTransaction {
    // Declared first so a dropped transaction rolls back before the guard is released.
    tx: Transaction<'static, Sqlite>,
    writer: OwnedMutexGuard<()>,
}

impl WriteTransaction {
    pub async fn commit(self) -> Result<(), sqlx::Error> {
        let Self { tx, writer } = self;
        tx.commit().await?;
        drop(writer);
        Ok(())
    }
}

impl Deref for WriteTransaction {
    type Target = SqliteConnection;

    fn deref(&self) -> &SqliteConnection {
        &self.tx
    }
}

impl DerefMut for WriteTransaction {
    fn deref_mut(&mut self) -> &mut SqliteConnection {
        &mut self.tx
    }
}
