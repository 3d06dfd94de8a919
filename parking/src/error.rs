//! Error types for EasyPark.
//!
//! Every rejected operation surfaces as a [`ParkingError`]. Reservation state
//! machine violations and capacity violations get their own nested enums so
//! callers can match on the precise reason, while [`ParkingError::kind`]
//! collapses everything into the coarse taxonomy a UI needs.

use crate::types::{AccountId, LotId, ReservationCode, ReservationId, ReservationStatus};
use easypark_core::storage::StorageError;
use thiserror::Error;

/// Result type for EasyPark operations.
pub type Result<T> = std::result::Result<T, ParkingError>;

/// Errors returned by EasyPark operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParkingError {
    /// A required field is missing or malformed.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Lookup by id, code or email found nothing.
    #[error("{entity} not found: {key}")]
    NotFound {
        /// Kind of record looked up
        entity: &'static str,
        /// Key that was looked up
        key: String,
    },

    /// The operation clashes with an existing record.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// The reservation is not in a state that allows the operation.
    #[error(transparent)]
    Transition(#[from] TransitionError),

    /// Lot capacity bounds would be violated.
    #[error(transparent)]
    Capacity(#[from] CapacityError),

    /// The caller does not own the lot.
    #[error("Account {caller} does not own lot {lot_id}")]
    PermissionDenied {
        /// Lot acted upon
        lot_id: LotId,
        /// Account attempting the action
        caller: AccountId,
    },

    /// Unknown email or wrong password.
    #[error("Invalid email or password")]
    InvalidCredentials,

    /// Email has not been verified yet.
    #[error("Account email has not been verified")]
    AccountUnverified,

    /// Account was deactivated.
    #[error("Account is inactive")]
    AccountInactive,

    /// Session token is unknown, revoked or expired.
    #[error("Session is missing or expired")]
    Unauthenticated,

    /// Backend failure while writing.
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// A collection could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl ParkingError {
    /// Shorthand for [`ParkingError::NotFound`]
    #[must_use]
    pub fn not_found(entity: &'static str, key: impl ToString) -> Self {
        Self::NotFound {
            entity,
            key: key.to_string(),
        }
    }

    /// Coarse category of this error
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) | Self::Serialization(_) => ErrorKind::Validation,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Conflict(_) | Self::Transition(_) => ErrorKind::Conflict,
            Self::Capacity(_) => ErrorKind::Capacity,
            Self::PermissionDenied { .. } => ErrorKind::PermissionDenied,
            Self::InvalidCredentials
            | Self::AccountUnverified
            | Self::AccountInactive
            | Self::Unauthenticated => ErrorKind::Credentials,
            Self::Storage(_) => ErrorKind::Storage,
        }
    }
}

impl From<serde_json::Error> for ParkingError {
    fn from(error: serde_json::Error) -> Self {
        Self::Serialization(error.to_string())
    }
}

/// Coarse error category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Bad input
    Validation,
    /// Missing record
    NotFound,
    /// Duplicate or out-of-order action
    Conflict,
    /// Lot capacity bounds
    Capacity,
    /// Ownership check failed
    PermissionDenied,
    /// Login or session failure
    Credentials,
    /// Backend failure
    Storage,
}

/// Reservation state machine violations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransitionError {
    /// Validating a code that was already validated.
    #[error("Reservation {code} is already confirmed")]
    AlreadyConfirmed {
        /// Code presented
        code: ReservationCode,
    },

    /// Validating a code whose booking was withdrawn.
    #[error("Reservation {code} was cancelled")]
    AlreadyCancelled {
        /// Code presented
        code: ReservationCode,
    },

    /// Validating a code whose stay is over.
    #[error("Reservation {code} is already completed")]
    AlreadyCompleted {
        /// Code presented
        code: ReservationCode,
    },

    /// Cancelling after check-in or after the stay ended.
    #[error("Reservation {id} cannot be cancelled once {status}")]
    NotCancellable {
        /// Reservation acted upon
        id: ReservationId,
        /// Its current state
        status: ReservationStatus,
    },

    /// Any other edge missing from the state graph.
    #[error("Invalid state transition for reservation {id}: {from} -> {to}")]
    Invalid {
        /// Reservation acted upon
        id: ReservationId,
        /// Current state
        from: ReservationStatus,
        /// Requested state
        to: ReservationStatus,
    },
}

impl TransitionError {
    /// Rejection for validating a reservation that is no longer pending
    #[must_use]
    pub fn not_pending(code: ReservationCode, status: ReservationStatus) -> Option<Self> {
        match status {
            ReservationStatus::Pending => None,
            ReservationStatus::Confirmed => Some(Self::AlreadyConfirmed { code }),
            ReservationStatus::Cancelled => Some(Self::AlreadyCancelled { code }),
            ReservationStatus::Completed => Some(Self::AlreadyCompleted { code }),
        }
    }
}

/// Lot capacity violations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CapacityError {
    /// Decrementing a lot with no free space.
    #[error("No space available in lot {lot_id}")]
    NoSpaceAvailable {
        /// Lot acted upon
        lot_id: LotId,
    },

    /// Setting availability above the lot's total.
    #[error("Lot {lot_id} has {total} spaces, cannot mark {requested} available")]
    ExceedsTotal {
        /// Lot acted upon
        lot_id: LotId,
        /// Requested availability
        requested: u32,
        /// Lot total
        total: u32,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_cover_the_taxonomy() {
        let code = ReservationCode::from_input("A1B2C3");
        assert_eq!(
            ParkingError::from(TransitionError::AlreadyConfirmed { code }).kind(),
            ErrorKind::Conflict
        );
        assert_eq!(
            ParkingError::from(CapacityError::NoSpaceAvailable { lot_id: LotId::new(1) }).kind(),
            ErrorKind::Capacity
        );
        assert_eq!(ParkingError::not_found("Lot", 9).kind(), ErrorKind::NotFound);
        assert_eq!(ParkingError::AccountUnverified.kind(), ErrorKind::Credentials);
        assert_eq!(
            ParkingError::from(StorageError::Unavailable("gone".into())).kind(),
            ErrorKind::Storage
        );
    }

    #[test]
    fn messages_are_human_readable() {
        assert_eq!(
            ParkingError::not_found("Reservation", "ZZZZZZ").to_string(),
            "Reservation not found: ZZZZZZ"
        );
        assert_eq!(
            ParkingError::PermissionDenied {
                lot_id: LotId::new(2),
                caller: AccountId::from("1"),
            }
            .to_string(),
            "Account 1 does not own lot 2"
        );
    }

    #[test]
    fn not_pending_maps_each_state() {
        let code = ReservationCode::from_input("A1B2C3");
        assert_eq!(TransitionError::not_pending(code.clone(), ReservationStatus::Pending), None);
        assert!(matches!(
            TransitionError::not_pending(code, ReservationStatus::Completed),
            Some(TransitionError::AlreadyCompleted { .. })
        ));
    }
}
