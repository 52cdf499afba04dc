//! Error taxonomy for the mesh stack (spec §7).
//!
//! One small `ErrorKind` enum, composed into a single `MeshError` that
//! carries the kind plus, where known, the bind site the error originated
//! from. Hand-rolled `std::error::Error` impls, no `thiserror`: a single
//! error type since the mesh stack has one narrow error surface instead of
//! per-protocol-layer ones.

use std::fmt;

use crate::address::BindSite;

/// Error kind taxonomy (spec §7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Input outside the valid octal-digit alphabet, or a reserved sentinel.
    InvalidAddress,
    /// The router could not compute a next hop for a destination.
    Unreachable,
    /// The physical link NAK'd every retry.
    TxFail,
    /// An operation did not complete within its budget.
    Timeout,
    /// The peer replied with a NACK (site occupied, mode mismatch, ...).
    Refused,
    /// An RX or TX queue is at capacity.
    QueueFull,
    /// The endpoint has not been configured yet.
    NotConfigured,
    /// `configure` was called on an already-configured endpoint.
    AlreadyConfigured,
    /// An async operation was aborted by the caller.
    Cancelled,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::InvalidAddress => "invalid address",
            ErrorKind::Unreachable => "unreachable",
            ErrorKind::TxFail => "tx failed after max retries",
            ErrorKind::Timeout => "timed out",
            ErrorKind::Refused => "refused by peer",
            ErrorKind::QueueFull => "queue full",
            ErrorKind::NotConfigured => "endpoint not configured",
            ErrorKind::AlreadyConfigured => "endpoint already configured",
            ErrorKind::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Error returned by public `Endpoint`/`NetworkRouter`/`ConnectionManager`
/// calls. Carries the originating bind site when known: spec §7 requires
/// "errors in async callbacks carry both the kind and the originating bind
/// site".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MeshError {
    pub kind: ErrorKind,
    pub site: Option<BindSite>,
}

impl MeshError {
    pub fn new(kind: ErrorKind) -> Self {
        MeshError { kind, site: None }
    }

    pub fn at(kind: ErrorKind, site: BindSite) -> Self {
        MeshError {
            kind,
            site: Some(site),
        }
    }

    pub fn invalid_address() -> Self {
        MeshError::new(ErrorKind::InvalidAddress)
    }

    pub fn unreachable() -> Self {
        MeshError::new(ErrorKind::Unreachable)
    }

    pub fn tx_fail() -> Self {
        MeshError::new(ErrorKind::TxFail)
    }

    pub fn timeout() -> Self {
        MeshError::new(ErrorKind::Timeout)
    }

    pub fn refused() -> Self {
        MeshError::new(ErrorKind::Refused)
    }

    pub fn queue_full() -> Self {
        MeshError::new(ErrorKind::QueueFull)
    }

    pub fn not_configured() -> Self {
        MeshError::new(ErrorKind::NotConfigured)
    }

    pub fn already_configured() -> Self {
        MeshError::new(ErrorKind::AlreadyConfigured)
    }

    pub fn cancelled() -> Self {
        MeshError::new(ErrorKind::Cancelled)
    }
}

impl fmt::Display for MeshError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.site {
            Some(site) => write!(f, "{} (site {:?})", self.kind, site),
            None => write!(f, "{}", self.kind),
        }
    }
}

impl std::error::Error for MeshError {}

pub type MeshResult<T> = Result<T, MeshError>;
