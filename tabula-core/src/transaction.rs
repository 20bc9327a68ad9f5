use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Unique identifier for a storage transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransactionId(pub u64);

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "txn-{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionStatus {
    Active,
    Committed,
    RolledBack,
}

/// Lifecycle bookkeeping shared by transaction handles.
#[derive(Debug)]
pub struct TransactionState {
    pub id: TransactionId,
    status: TransactionStatus,
}

impl TransactionState {
    pub fn new(id: TransactionId) -> Self {
        Self {
            id,
            status: TransactionStatus::Active,
        }
    }

    pub fn status(&self) -> TransactionStatus {
        self.status
    }

    pub fn ensure_active(&self) -> Result<()> {
        match self.status {
            TransactionStatus::Active => Ok(()),
            other => Err(Error::Storage(format!(
                "Transaction {} is no longer active ({:?})",
                self.id, other
            ))),
        }
    }

    pub fn commit(&mut self) -> Result<()> {
        self.ensure_active()?;
        self.status = TransactionStatus::Committed;
        Ok(())
    }

    pub fn rollback(&mut self) {
        if self.status == TransactionStatus::Active {
            self.status = TransactionStatus::RolledBack;
        }
    }
}

/// Hands out monotonically increasing transaction ids.
#[derive(Debug)]
pub struct TransactionIdGenerator {
    next: AtomicU64,
}

impl TransactionIdGenerator {
    pub fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
        }
    }

    pub fn next_id(&self) -> TransactionId {
        TransactionId(self.next.fetch_add(1, Ordering::Relaxed))
    }
}
