use serde::{Deserialize, Serialize};

/// Which leg of a swap a [`crate::Transfer`](crate::transfer::Transfer) row represents.
///
/// The user performs OUT on the source chain; the relay performs IN on the
/// destination chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "transfer_type", rename_all = "snake_case")]
pub enum TransferType {
    Out,
    In,
}

/// Lifecycle position of a single transfer leg.
///
/// OUT rows enter directly at `Locked` (authored by the event ingestor on
/// observation). IN rows start at `TransferInStart` and are driven forward by
/// the reconciler loops in `relay-reconcile`. `Confirmed` and `Refunded` are
/// terminal: no transition may ever leave them (spec invariant: once terminal,
/// always terminal).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "transfer_status", rename_all = "snake_case")]
pub enum TransferStatus {
    TransferInStart,
    TransferInPending,
    Locked,
    ConfirmPending,
    RefundPending,
    Confirmed,
    Refunded,
}

impl TransferStatus {
    /// `true` once a row can never transition again.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Confirmed | Self::Refunded)
    }
}

/// The on-chain `status` field returned by the contract's `transfers(id)` view.
///
/// Values are canonical per spec.md §9: 0 is "not yet submitted" (Undefined),
/// not an error sentinel — do not reinterpret it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum RemoteStatus {
    Undefined = 0,
    Pending = 1,
    Confirmed = 2,
    Refunded = 3,
}

impl TryFrom<u8> for RemoteStatus {
    type Error = crate::Error;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Undefined),
            1 => Ok(Self::Pending),
            2 => Ok(Self::Confirmed),
            3 => Ok(Self::Refunded),
            other => Err(crate::Error::UnknownRemoteStatus(other)),
        }
    }
}
