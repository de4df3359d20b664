//! Core types for the session layer.

use crate::error::{Result, SessionError};
use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! resource_id {
    ($(#[$meta:meta])* $name:ident, $label:literal) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(pub u64);

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($label, "({})"), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($label, "#{}"), self.0)
            }
        }
    };
}

resource_id!(
    /// Stable identifier for a database registered with a session.
    DatabaseId,
    "DatabaseId"
);
resource_id!(
    /// Stable identifier for a transaction coordinator.
    TransactionId,
    "TransactionId"
);
resource_id!(
    /// Stable identifier for a statement.
    StatementId,
    "StatementId"
);
resource_id!(
    /// Stable identifier for an open blob.
    BlobId,
    "BlobId"
);
resource_id!(
    /// Stable identifier for an open array slice.
    ArrayId,
    "ArrayId"
);

/// Server-side attachment handle, assigned by the transport on connect.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AttachmentHandle(pub u32);

/// Server-side transaction handle, assigned by the transport on start.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransactionHandle(pub u32);

/// Server-side statement handle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StatementHandle(pub u32);

/// Transaction access mode.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AccessMode {
    Read,
    #[default]
    Write,
}

/// Transaction isolation level.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum IsolationLevel {
    /// Table-level locking, fully serializable.
    Consistency,
    /// Snapshot isolation.
    #[default]
    Concurrency,
    /// Read committed, sees the latest committed record version.
    ReadDirty,
    /// Read committed, waits on uncommitted record versions.
    ReadCommitted,
}

/// What the server does on a lock conflict.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LockResolution {
    #[default]
    Wait,
    NoWait,
}

bitflags::bitflags! {
    /// Behavioral transaction flags. Combine with `|`.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct TransactionFlags: u8 {
        /// Ignore limbo records left by unresolved two-phase commits.
        const IGNORE_LIMBO = 0x01;
        const AUTOCOMMIT = 0x02;
        /// Skip the undo log for this transaction.
        const NO_AUTO_UNDO = 0x04;
    }
}

impl Default for TransactionFlags {
    fn default() -> Self {
        Self::empty()
    }
}

/// Default policy used when a database joins a transaction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct TransactionPolicy {
    pub access: AccessMode,
    pub isolation: IsolationLevel,
    pub lock_resolution: LockResolution,
    pub flags: TransactionFlags,
}

impl TransactionPolicy {
    /// Read-only snapshot, the usual choice for reporting queries.
    pub fn read_only() -> Self {
        Self {
            access: AccessMode::Read,
            ..Default::default()
        }
    }
}

/// Table lock reserved when the transaction starts.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TableReservation {
    SharedWrite,
    SharedRead,
    ProtectedWrite,
    ProtectedRead,
}

impl TryFrom<u8> for TableReservation {
    type Error = SessionError;

    fn try_from(code: u8) -> Result<Self> {
        match code {
            0 => Ok(TableReservation::SharedWrite),
            1 => Ok(TableReservation::SharedRead),
            2 => Ok(TableReservation::ProtectedWrite),
            3 => Ok(TableReservation::ProtectedRead),
            other => Err(SessionError::InvalidArgument(format!(
                "Illegal table reservation code: {}",
                other
            ))),
        }
    }
}
