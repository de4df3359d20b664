//! Transaction option blocks.
//!
//! One block per attachment describes how that database participates in a
//! transaction: a version byte, then single-byte option codes, some followed
//! by a length-prefixed table name operand.

use crate::error::{Result, SessionError};
use crate::types::{
    AccessMode, IsolationLevel, LockResolution, TableReservation, TransactionFlags,
    TransactionPolicy,
};
use std::fmt;

pub const TPB_VERSION3: u8 = 3;
pub const TPB_CONSISTENCY: u8 = 1;
pub const TPB_CONCURRENCY: u8 = 2;
pub const TPB_SHARED: u8 = 3;
pub const TPB_PROTECTED: u8 = 4;
pub const TPB_WAIT: u8 = 6;
pub const TPB_NOWAIT: u8 = 7;
pub const TPB_READ: u8 = 8;
pub const TPB_WRITE: u8 = 9;
pub const TPB_LOCK_READ: u8 = 10;
pub const TPB_LOCK_WRITE: u8 = 11;
pub const TPB_IGNORE_LIMBO: u8 = 14;
pub const TPB_READ_COMMITTED: u8 = 15;
pub const TPB_AUTOCOMMIT: u8 = 16;
pub const TPB_REC_VERSION: u8 = 17;
pub const TPB_NO_REC_VERSION: u8 = 18;
pub const TPB_NO_AUTO_UNDO: u8 = 20;

/// Longest table name an operand can carry.
pub const MAX_TABLE_NAME_LEN: usize = 255;

/// Accumulates option codes and operands into one contiguous buffer.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct OptionBlock {
    buf: Vec<u8>,
}

impl OptionBlock {
    /// An empty block, without even the version byte.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the block for one attachment from a policy.
    pub fn from_policy(policy: &TransactionPolicy) -> Self {
        let mut block = Self::new();
        block.insert(TPB_VERSION3);

        block.insert(match policy.access {
            AccessMode::Read => TPB_READ,
            AccessMode::Write => TPB_WRITE,
        });

        match policy.isolation {
            IsolationLevel::Consistency => block.insert(TPB_CONSISTENCY),
            IsolationLevel::ReadDirty => {
                block.insert(TPB_READ_COMMITTED);
                block.insert(TPB_REC_VERSION);
            }
            IsolationLevel::ReadCommitted => {
                block.insert(TPB_READ_COMMITTED);
                block.insert(TPB_NO_REC_VERSION);
            }
            IsolationLevel::Concurrency => block.insert(TPB_CONCURRENCY),
        }

        block.insert(match policy.lock_resolution {
            LockResolution::NoWait => TPB_NOWAIT,
            LockResolution::Wait => TPB_WAIT,
        });

        if policy.flags.contains(TransactionFlags::IGNORE_LIMBO) {
            block.insert(TPB_IGNORE_LIMBO);
        }
        if policy.flags.contains(TransactionFlags::AUTOCOMMIT) {
            block.insert(TPB_AUTOCOMMIT);
        }
        if policy.flags.contains(TransactionFlags::NO_AUTO_UNDO) {
            block.insert(TPB_NO_AUTO_UNDO);
        }

        block
    }

    /// Append a single option code.
    pub fn insert(&mut self, code: u8) {
        self.buf.push(code);
    }

    /// Append a length-prefixed string operand.
    pub fn insert_str(&mut self, operand: &str) -> Result<()> {
        if operand.is_empty() || operand.len() > MAX_TABLE_NAME_LEN {
            return Err(SessionError::InvalidArgument(format!(
                "Option operand must be 1 to {} bytes, got {}",
                MAX_TABLE_NAME_LEN,
                operand.len()
            )));
        }
        self.buf.push(operand.len() as u8);
        self.buf.extend_from_slice(operand.as_bytes());
        Ok(())
    }

    /// Append a table lock reservation: lock mode, table name, sharing mode.
    pub fn reserve_table(&mut self, table: &str, reservation: TableReservation) -> Result<()> {
        let (lock, sharing) = match reservation {
            TableReservation::SharedWrite => (TPB_LOCK_WRITE, TPB_SHARED),
            TableReservation::SharedRead => (TPB_LOCK_READ, TPB_SHARED),
            TableReservation::ProtectedWrite => (TPB_LOCK_WRITE, TPB_PROTECTED),
            TableReservation::ProtectedRead => (TPB_LOCK_READ, TPB_PROTECTED),
        };

        // Validate before touching the buffer so a bad name leaves it intact.
        if table.is_empty() || table.len() > MAX_TABLE_NAME_LEN {
            return Err(SessionError::InvalidArgument(format!(
                "Table name must be 1 to {} bytes, got {}",
                MAX_TABLE_NAME_LEN,
                table.len()
            )));
        }

        self.insert(lock);
        self.insert_str(table)?;
        self.insert(sharing);
        Ok(())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }
}

impl fmt::Debug for OptionBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OptionBlock({})", hex::encode(&self.buf))
    }
}
