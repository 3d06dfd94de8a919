//! Reservation aggregate.
//!
//! Owns the reservation lifecycle:
//!
//! ```text
//! pending ──validate──▶ confirmed ──complete──▶ completed
//!    │
//!    └──cancel──▶ cancelled
//! ```
//!
//! The graph also has a `confirmed → cancelled` edge, but the cancel command
//! refuses it: a checked-in vehicle cannot be cancelled, only completed.
//!
//! The reducer never touches lot capacity. Holding and releasing a space is
//! the coordinator's job; [`ReservationEvent::released_lot`] tells it when a
//! space has to go back to the lot.

use crate::error::{ParkingError, TransitionError};
use crate::types::{
    AccountId, LotId, Plate, Reservation, ReservationCode, ReservationId, ReservationState,
    ReservationStatus, SpaceId,
};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use easypark_core::environment::{Clock, Entropy};
use easypark_core::reducer::Reducer;
use easypark_core::{SmallVec, smallvec};
use std::collections::HashSet;
use std::sync::Arc;

// ============================================================================
// Actions
// ============================================================================

/// Commands accepted by the reservation ledger
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReservationAction {
    /// Book a space
    Create {
        /// Booking account
        account_id: AccountId,
        /// Target lot
        lot_id: LotId,
        /// Requested start
        starts_at: NaiveDateTime,
        /// Estimated stay, must be positive
        duration_minutes: u32,
        /// Raw plate, normalized on the way in
        plate: String,
    },

    /// Operator validates a code at the gate
    Validate {
        /// Code as typed, case-insensitive
        code: String,
    },

    /// Withdraw a pending booking
    Cancel {
        /// Reservation to cancel
        id: ReservationId,
    },

    /// Vehicle left
    Complete {
        /// Reservation to complete
        id: ReservationId,
    },
}

// ============================================================================
// Events
// ============================================================================

/// Facts recorded by the reservation ledger
#[derive(Clone, Debug, PartialEq)]
pub enum ReservationEvent {
    /// A pending reservation was recorded
    Created {
        /// The new record
        reservation: Reservation,
    },

    /// A reservation was validated and a space assigned
    Confirmed {
        /// Reservation id
        id: ReservationId,
        /// Code that was presented
        code: ReservationCode,
        /// Lot of the reservation
        lot_id: LotId,
        /// Assigned space
        space: SpaceId,
        /// Check-in time
        entered_at: DateTime<Utc>,
    },

    /// A pending reservation was withdrawn
    Cancelled {
        /// Reservation id
        id: ReservationId,
        /// Lot of the reservation
        lot_id: LotId,
        /// When it was withdrawn
        cancelled_at: DateTime<Utc>,
    },

    /// A confirmed stay ended
    Completed {
        /// Reservation id
        id: ReservationId,
        /// Lot of the reservation
        lot_id: LotId,
        /// Check-out time
        exited_at: DateTime<Utc>,
    },
}

impl ReservationEvent {
    /// Lot whose held space this event gives back, if any
    #[must_use]
    pub const fn released_lot(&self) -> Option<LotId> {
        match self {
            Self::Cancelled { lot_id, .. } | Self::Completed { lot_id, .. } => Some(*lot_id),
            Self::Created { .. } | Self::Confirmed { .. } => None,
        }
    }
}

// ============================================================================
// Queries
// ============================================================================

/// Operator listing filter. Every field set must match.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReservationFilter {
    /// Lifecycle state
    pub status: Option<ReservationStatus>,
    /// Lot
    pub lot_id: Option<LotId>,
    /// Calendar date of the requested start
    pub date: Option<NaiveDate>,
}

impl ReservationFilter {
    /// Whether a reservation passes the filter
    #[must_use]
    pub fn matches(&self, reservation: &Reservation) -> bool {
        self.status.is_none_or(|s| reservation.status == s)
            && self.lot_id.is_none_or(|l| reservation.lot_id == l)
            && self.date.is_none_or(|d| reservation.starts_at.date() == d)
    }
}

// ============================================================================
// Environment
// ============================================================================

/// Environment dependencies for the reservation ledger
#[derive(Clone)]
pub struct ReservationEnvironment {
    /// Clock for timestamps
    pub clock: Arc<dyn Clock>,
    /// Randomness for codes and space offsets
    pub entropy: Arc<dyn Entropy>,
    /// How many codes to draw before giving up on a unique one
    pub code_attempts: usize,
}

impl ReservationEnvironment {
    /// Creates a new `ReservationEnvironment`
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>, entropy: Arc<dyn Entropy>, code_attempts: usize) -> Self {
        Self {
            clock,
            entropy,
            code_attempts,
        }
    }
}

// ============================================================================
// Reducer
// ============================================================================

/// Reducer for the reservation ledger
#[derive(Clone, Debug, Default)]
pub struct ReservationReducer;

impl ReservationReducer {
    /// First space number of a lot
    const SPACE_BASE: u64 = 100;
    /// Space numbers reserved per lot id
    const SPACES_PER_LOT: u64 = 10;
    /// Range of the random offset added to the base
    const SPACE_SPREAD: usize = 50;

    /// Creates a new `ReservationReducer`
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Validates `Create` command
    pub(crate) fn validate_create(
        account_id: &AccountId,
        duration_minutes: u32,
        plate: &str,
    ) -> Result<Plate, ParkingError> {
        if account_id.as_str().is_empty() {
            return Err(ParkingError::Validation("account id is required".to_string()));
        }

        if duration_minutes == 0 {
            return Err(ParkingError::Validation(
                "duration must be greater than zero minutes".to_string(),
            ));
        }

        Plate::parse(plate)
    }

    /// Id for the next reservation; the last counter value is never handed out
    fn next_id(state: &ReservationState) -> Result<ReservationId, ParkingError> {
        state
            .next_id
            .checked_add(1)
            .map(|_| ReservationId::new(state.next_id))
            .ok_or_else(|| ParkingError::Conflict("reservation id space exhausted".to_string()))
    }

    /// Draws codes until one is not used by any stored reservation
    fn unique_code(
        state: &ReservationState,
        env: &ReservationEnvironment,
    ) -> Result<ReservationCode, ParkingError> {
        for _ in 0..env.code_attempts.max(1) {
            let code = ReservationCode::generate(env.entropy.as_ref());
            if !state.code_in_use(&code) {
                return Ok(code);
            }
        }

        Err(ParkingError::Conflict(format!(
            "could not generate a unique reservation code in {} attempts",
            env.code_attempts
        )))
    }

    /// Picks a space number not held by another confirmed reservation in the lot
    fn allocate_space(
        state: &ReservationState,
        lot_id: LotId,
        env: &ReservationEnvironment,
    ) -> SpaceId {
        let held: HashSet<&str> = state
            .reservations
            .iter()
            .filter(|r| r.lot_id == lot_id && r.status == ReservationStatus::Confirmed)
            .filter_map(|r| r.assigned_space.as_ref().map(SpaceId::as_str))
            .collect();

        let base = Self::SPACE_BASE + u64::from(lot_id.value()) * Self::SPACES_PER_LOT;
        let mut number = base + env.entropy.pick(Self::SPACE_SPREAD) as u64;
        while held.contains(number.to_string().as_str()) {
            number += 1;
        }
        SpaceId::from_number(number)
    }

    /// Applies an event to state
    fn apply_event(state: &mut ReservationState, event: &ReservationEvent) {
        match event {
            ReservationEvent::Created { reservation } => {
                state.next_id = state.next_id.max(reservation.id.value().saturating_add(1));
                state.reservations.push(reservation.clone());
            }

            ReservationEvent::Confirmed {
                id,
                space,
                entered_at,
                ..
            } => {
                if let Some(reservation) = state.get_mut(*id) {
                    reservation.status = ReservationStatus::Confirmed;
                    reservation.assigned_space = Some(space.clone());
                    reservation.entered_at = Some(*entered_at);
                }
            }

            ReservationEvent::Cancelled {
                id, cancelled_at, ..
            } => {
                if let Some(reservation) = state.get_mut(*id) {
                    reservation.status = ReservationStatus::Cancelled;
                    reservation.cancelled_at = Some(*cancelled_at);
                }
            }

            ReservationEvent::Completed { id, exited_at, .. } => {
                if let Some(reservation) = state.get_mut(*id) {
                    reservation.status = ReservationStatus::Completed;
                    reservation.exited_at = Some(*exited_at);
                }
            }
        }
    }
}

impl Reducer for ReservationReducer {
    type State = ReservationState;
    type Action = ReservationAction;
    type Event = ReservationEvent;
    type Environment = ReservationEnvironment;
    type Error = ParkingError;

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> Result<SmallVec<[ReservationEvent; 4]>, ParkingError> {
        let event = match action {
            ReservationAction::Create {
                account_id,
                lot_id,
                starts_at,
                duration_minutes,
                plate,
            } => {
                let plate = Self::validate_create(&account_id, duration_minutes, &plate)?;
                let id = Self::next_id(state)?;
                let code = Self::unique_code(state, env)?;

                ReservationEvent::Created {
                    reservation: Reservation {
                        id,
                        code,
                        account_id,
                        lot_id,
                        starts_at,
                        duration_minutes,
                        plate,
                        assigned_space: None,
                        status: ReservationStatus::Pending,
                        created_at: env.clock.now(),
                        entered_at: None,
                        exited_at: None,
                        cancelled_at: None,
                    },
                }
            }

            ReservationAction::Validate { code } => {
                let reservation = state
                    .find_by_code(&code)
                    .ok_or_else(|| ParkingError::not_found("Reservation", code.trim()))?;

                if let Some(rejection) =
                    TransitionError::not_pending(reservation.code.clone(), reservation.status)
                {
                    return Err(rejection.into());
                }

                ReservationEvent::Confirmed {
                    id: reservation.id,
                    code: reservation.code.clone(),
                    lot_id: reservation.lot_id,
                    space: Self::allocate_space(state, reservation.lot_id, env),
                    entered_at: env.clock.now(),
                }
            }

            ReservationAction::Cancel { id } => {
                let reservation = state
                    .get(id)
                    .ok_or_else(|| ParkingError::not_found("Reservation", id))?;

                if reservation.status != ReservationStatus::Pending {
                    return Err(TransitionError::NotCancellable {
                        id,
                        status: reservation.status,
                    }
                    .into());
                }

                ReservationEvent::Cancelled {
                    id,
                    lot_id: reservation.lot_id,
                    cancelled_at: env.clock.now(),
                }
            }

            ReservationAction::Complete { id } => {
                let reservation = state
                    .get(id)
                    .ok_or_else(|| ParkingError::not_found("Reservation", id))?;

                if !reservation
                    .status
                    .can_transition_to(ReservationStatus::Completed)
                {
                    return Err(TransitionError::Invalid {
                        id,
                        from: reservation.status,
                        to: ReservationStatus::Completed,
                    }
                    .into());
                }

                ReservationEvent::Completed {
                    id,
                    lot_id: reservation.lot_id,
                    exited_at: env.clock.now(),
                }
            }
        };

        Self::apply_event(state, &event);
        Ok(smallvec![event])
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use easypark_testing::{ReducerTest, ScriptedEntropy, test_clock};

    fn env_with(script: Vec<usize>) -> ReservationEnvironment {
        ReservationEnvironment::new(
            Arc::new(test_clock()),
            Arc::new(ScriptedEntropy::new(script)),
            4,
        )
    }

    fn create(plate: &str) -> ReservationAction {
        ReservationAction::Create {
            account_id: AccountId::from("1"),
            lot_id: LotId::new(1),
            starts_at: NaiveDate::from_ymd_opt(2025, 11, 27)
                .unwrap()
                .and_hms_opt(10, 0, 0)
                .unwrap(),
            duration_minutes: 120,
            plate: plate.to_string(),
        }
    }

    fn state_with(status: ReservationStatus) -> ReservationState {
        let mut state = ReservationState::new(Vec::new(), 1);
        ReservationReducer::new()
            .reduce(&mut state, create("abc123"), &env_with(vec![0]))
            .unwrap();
        state.reservations[0].status = status;
        if status != ReservationStatus::Pending {
            state.reservations[0].assigned_space = Some(SpaceId::from_number(110));
        }
        state
    }

    #[test]
    fn test_create_records_pending_reservation() {
        ReducerTest::new(ReservationReducer::new())
            .with_env(env_with(vec![0, 1, 2, 26, 27, 28]))
            .given_state(ReservationState::new(Vec::new(), 1))
            .when_action(create(" abc123 "))
            .then_state(|state| {
                assert_eq!(state.count(), 1);
                assert_eq!(state.next_id, 2);
                let reservation = &state.reservations[0];
                assert_eq!(reservation.id, ReservationId::new(1));
                assert_eq!(reservation.code.as_str(), "ABC012");
                assert_eq!(reservation.plate.as_str(), "ABC123");
                assert_eq!(reservation.status, ReservationStatus::Pending);
                assert_eq!(reservation.assigned_space, None);
                assert_eq!(reservation.entered_at, None);
            })
            .then_events(|events| {
                assert!(matches!(events, [ReservationEvent::Created { .. }]));
            })
            .run();
    }

    #[test]
    fn test_create_rejects_zero_duration() {
        let mut action = create("abc123");
        if let ReservationAction::Create {
            duration_minutes, ..
        } = &mut action
        {
            *duration_minutes = 0;
        }

        ReducerTest::new(ReservationReducer::new())
            .with_env(env_with(vec![0]))
            .given_state(ReservationState::new(Vec::new(), 1))
            .when_action(action)
            .then_state(|state| assert_eq!(state.count(), 0))
            .then_error(|error| assert!(matches!(error, ParkingError::Validation(_))))
            .run();
    }

    #[test]
    fn test_create_retries_colliding_codes() {
        // First reservation takes AAAAAA; the second draws AAAAAA once, then BBBBBB.
        let mut state = ReservationState::new(Vec::new(), 1);
        let env = env_with(vec![0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 1, 1, 1, 1, 1, 1]);
        ReservationReducer::new()
            .reduce(&mut state, create("AAA111"), &env)
            .unwrap();
        ReservationReducer::new()
            .reduce(&mut state, create("BBB222"), &env)
            .unwrap();

        assert_eq!(state.reservations[0].code.as_str(), "AAAAAA");
        assert_eq!(state.reservations[1].code.as_str(), "BBBBBB");
    }

    #[test]
    fn test_create_gives_up_after_attempts() {
        let mut state = ReservationState::new(Vec::new(), 1);
        let env = env_with(vec![0]);
        ReservationReducer::new()
            .reduce(&mut state, create("AAA111"), &env)
            .unwrap();

        ReducerTest::new(ReservationReducer::new())
            .with_env(env)
            .given_state(state)
            .when_action(create("BBB222"))
            .then_state(|state| assert_eq!(state.count(), 1))
            .then_error(|error| assert!(matches!(error, ParkingError::Conflict(_))))
            .run();
    }

    #[test]
    fn test_create_rejects_exhausted_id_space() {
        ReducerTest::new(ReservationReducer::new())
            .with_env(env_with(vec![0]))
            .given_state(ReservationState::new(Vec::new(), u64::MAX))
            .when_action(create("abc123"))
            .then_state(|state| {
                assert_eq!(state.count(), 0);
                assert_eq!(state.next_id, u64::MAX);
            })
            .then_error(|error| assert!(matches!(error, ParkingError::Conflict(_))))
            .run();
    }

    #[test]
    fn test_validate_assigns_space() {
        ReducerTest::new(ReservationReducer::new())
            .with_env(env_with(vec![7]))
            .given_state(state_with(ReservationStatus::Pending))
            .when_action(ReservationAction::Validate {
                code: "aaaaaa".to_string(),
            })
            .then_state(|state| {
                let reservation = &state.reservations[0];
                assert_eq!(reservation.status, ReservationStatus::Confirmed);
                // 100 + lot 1 * 10 + offset 7
                assert_eq!(
                    reservation.assigned_space.as_ref().map(SpaceId::as_str),
                    Some("117")
                );
                assert!(reservation.entered_at.is_some());
            })
            .then_events(|events| {
                assert!(matches!(events, [ReservationEvent::Confirmed { .. }]));
            })
            .run();
    }

    #[test]
    fn test_validate_skips_held_spaces() {
        let mut state = ReservationState::new(Vec::new(), 1);
        let env = env_with(vec![0]);
        let reducer = ReservationReducer::new();
        reducer.reduce(&mut state, create("AAA111"), &env).unwrap();
        state.reservations[0].code = ReservationCode::from_input("FIRST1");
        reducer.reduce(&mut state, create("BBB222"), &env).unwrap();

        reducer
            .reduce(&mut state, ReservationAction::Validate { code: "FIRST1".into() }, &env)
            .unwrap();
        reducer
            .reduce(&mut state, ReservationAction::Validate { code: "AAAAAA".into() }, &env)
            .unwrap();

        let spaces: Vec<_> = state
            .reservations
            .iter()
            .map(|r| r.assigned_space.clone().unwrap())
            .collect();
        assert_eq!(spaces[0].as_str(), "110");
        assert_eq!(spaces[1].as_str(), "111");
    }

    #[test]
    fn test_validate_unknown_code() {
        ReducerTest::new(ReservationReducer::new())
            .with_env(env_with(vec![0]))
            .given_state(state_with(ReservationStatus::Pending))
            .when_action(ReservationAction::Validate {
                code: "ZZZZZZ".to_string(),
            })
            .then_error(|error| assert!(matches!(error, ParkingError::NotFound { .. })))
            .run();
    }

    fn assert_validate_rejected(status: ReservationStatus, check: fn(&TransitionError) -> bool) {
        ReducerTest::new(ReservationReducer::new())
            .with_env(env_with(vec![0]))
            .given_state(state_with(status))
            .when_action(ReservationAction::Validate {
                code: "AAAAAA".to_string(),
            })
            .then_state(move |state| assert_eq!(state.reservations[0].status, status))
            .then_error(move |error| {
                assert!(
                    matches!(error, ParkingError::Transition(inner) if check(inner)),
                    "{error:?}"
                );
            })
            .run();
    }

    #[test]
    fn test_validate_rejects_non_pending() {
        assert_validate_rejected(ReservationStatus::Confirmed, |e| {
            matches!(e, TransitionError::AlreadyConfirmed { .. })
        });
        assert_validate_rejected(ReservationStatus::Cancelled, |e| {
            matches!(e, TransitionError::AlreadyCancelled { .. })
        });
        assert_validate_rejected(ReservationStatus::Completed, |e| {
            matches!(e, TransitionError::AlreadyCompleted { .. })
        });
    }

    #[test]
    fn test_cancel_pending_releases_lot() {
        ReducerTest::new(ReservationReducer::new())
            .with_env(env_with(vec![0]))
            .given_state(state_with(ReservationStatus::Pending))
            .when_action(ReservationAction::Cancel {
                id: ReservationId::new(1),
            })
            .then_state(|state| {
                assert_eq!(state.reservations[0].status, ReservationStatus::Cancelled);
                assert!(state.reservations[0].cancelled_at.is_some());
            })
            .then_events(|events| {
                assert_eq!(events[0].released_lot(), Some(LotId::new(1)));
            })
            .run();
    }

    #[test]
    fn test_cancel_confirmed_is_refused() {
        ReducerTest::new(ReservationReducer::new())
            .with_env(env_with(vec![0]))
            .given_state(state_with(ReservationStatus::Confirmed))
            .when_action(ReservationAction::Cancel {
                id: ReservationId::new(1),
            })
            .then_state(|state| {
                assert_eq!(state.reservations[0].status, ReservationStatus::Confirmed);
            })
            .then_error(|error| {
                assert!(matches!(
                    error,
                    ParkingError::Transition(TransitionError::NotCancellable {
                        status: ReservationStatus::Confirmed,
                        ..
                    })
                ));
            })
            .run();
    }

    #[test]
    fn test_complete_requires_confirmed() {
        ReducerTest::new(ReservationReducer::new())
            .with_env(env_with(vec![0]))
            .given_state(state_with(ReservationStatus::Pending))
            .when_action(ReservationAction::Complete {
                id: ReservationId::new(1),
            })
            .then_state(|state| {
                assert_eq!(state.reservations[0].status, ReservationStatus::Pending);
            })
            .then_error(|error| {
                assert!(matches!(
                    error,
                    ParkingError::Transition(TransitionError::Invalid {
                        from: ReservationStatus::Pending,
                        to: ReservationStatus::Completed,
                        ..
                    })
                ));
            })
            .run();
    }

    #[test]
    fn test_complete_confirmed() {
        ReducerTest::new(ReservationReducer::new())
            .with_env(env_with(vec![0]))
            .given_state(state_with(ReservationStatus::Confirmed))
            .when_action(ReservationAction::Complete {
                id: ReservationId::new(1),
            })
            .then_state(|state| {
                assert_eq!(state.reservations[0].status, ReservationStatus::Completed);
                assert!(state.reservations[0].exited_at.is_some());
            })
            .then_events(|events| {
                assert_eq!(events[0].released_lot(), Some(LotId::new(1)));
            })
            .run();
    }

    #[test]
    fn test_filter_matches_every_set_field() {
        let state = state_with(ReservationStatus::Pending);
        let reservation = &state.reservations[0];

        assert!(ReservationFilter::default().matches(reservation));
        assert!(
            ReservationFilter {
                status: Some(ReservationStatus::Pending),
                lot_id: Some(LotId::new(1)),
                date: NaiveDate::from_ymd_opt(2025, 11, 27),
            }
            .matches(reservation)
        );
        assert!(
            !ReservationFilter {
                date: NaiveDate::from_ymd_opt(2025, 11, 28),
                ..ReservationFilter::default()
            }
            .matches(reservation)
        );
    }
}
