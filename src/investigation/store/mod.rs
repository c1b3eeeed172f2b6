use crate::context::RunContext;
use crate::errors::SleuthError;
use crate::investigation::InvestigationRecord;
use std::collections::HashMap;
use std::sync::Mutex as StdMutex;

/// Concurrent map of investigation id to record, used for history and
/// active lookup. All operations are serialized by an internal lock, so
/// observations per id are linearizable.
#[derive(Default)]
pub struct InvestigationStore {
    inner: StdMutex<StoreInner>,
}

#[derive(Default)]
struct StoreInner {
    records: HashMap<String, InvestigationRecord>,
    closed: bool,
}

impl InvestigationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a fresh record. Fails with `Duplicate` when the id exists and
    /// `Shutdown` after close.
    pub fn store(&self, investigation: &InvestigationRecord) -> Result<(), SleuthError> {
        if investigation.id.is_empty() {
            return Err(SleuthError::InvalidInput(
                "investigation id must not be empty".into(),
            ));
        }
        let mut inner = self
            .inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if inner.closed {
            return Err(SleuthError::Shutdown);
        }
        if inner.records.contains_key(&investigation.id) {
            return Err(SleuthError::Duplicate {
                id: investigation.id.clone(),
            });
        }
        inner
            .records
            .insert(investigation.id.clone(), investigation.clone());
        Ok(())
    }

    /// Read a record by id. Honours context cancellation on entry.
    pub async fn get(
        &self,
        ctx: &RunContext,
        id: &str,
    ) -> Result<InvestigationRecord, SleuthError> {
        ctx.check()?;
        let inner = self
            .inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        inner
            .records
            .get(id)
            .cloned()
            .ok_or_else(|| SleuthError::NotFound { id: id.to_string() })
    }

    /// Replace an existing record. Fails with `NotFound` when the id is
    /// absent and `Shutdown` after close.
    pub fn update(&self, investigation: &InvestigationRecord) -> Result<(), SleuthError> {
        let mut inner = self
            .inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if inner.closed {
            return Err(SleuthError::Shutdown);
        }
        if !inner.records.contains_key(&investigation.id) {
            return Err(SleuthError::NotFound {
                id: investigation.id.clone(),
            });
        }
        inner
            .records
            .insert(investigation.id.clone(), investigation.clone());
        Ok(())
    }

    /// Idempotent; subsequent mutating calls fail with `Shutdown`.
    pub fn close(&self) {
        self.inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .closed = true;
    }

    pub fn is_closed(&self) -> bool {
        self.inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .closed
    }

    pub fn len(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .records
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
