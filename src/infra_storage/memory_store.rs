use crate::domain_model::*;
use crate::domain_port::*;
use std::sync::Mutex;
use std::time::Duration;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Session persistence that lives and dies with the process. Reads and
/// writes can be made to fail on demand, and loads can be slowed down.
#[derive(Default)]
pub struct MemorySessionStore {
    record: Mutex<Option<SessionRecord>>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    load_latency: Mutex<Option<Duration>>,
    saves: AtomicUsize,
    deletes: AtomicUsize,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_record(record: SessionRecord) -> Self {
        let store = Self::new();
        if let Ok(mut slot) = store.record.lock() {
            *slot = Some(record);
        }
        store
    }

    pub fn stored(&self) -> Option<SessionRecord> {
        self.record.lock().ok().and_then(|r| r.clone())
    }

    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn set_load_latency(&self, latency: Duration) {
        if let Ok(mut slot) = self.load_latency.lock() {
            *slot = Some(latency);
        }
    }

    pub fn saves(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    pub fn deletes(&self) -> usize {
        self.deletes.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl SessionPersistence for MemorySessionStore {
    async fn load_session(&self) -> Result<SessionRecord, PersistenceError> {
        // The record is read up front; a slow load hands back what was there
        // when it started.
        let loaded = if self.fail_reads.load(Ordering::SeqCst) {
            Err(PersistenceError::Read("simulated read fault".to_string()))
        } else {
            self.stored().ok_or(PersistenceError::NotFound)
        };
        let latency = self.load_latency.lock().ok().and_then(|l| *l);
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        loaded
    }

    async fn save_session(&self, record: &SessionRecord) -> Result<(), PersistenceError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(PersistenceError::Write("simulated write fault".to_string()));
        }
        let mut slot = self
            .record
            .lock()
            .map_err(|e| PersistenceError::Write(e.to_string()))?;
        *slot = Some(record.clone());
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn delete_session(&self) -> Result<(), PersistenceError> {
        let mut slot = self
            .record
            .lock()
            .map_err(|e| PersistenceError::Write(e.to_string()))?;
        *slot = None;
        self.deletes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
