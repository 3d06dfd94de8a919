//! Tariff aggregate.
//!
//! A keyed price table. Prices must be positive; deleting a tariff never
//! touches the lots that reference it.

use crate::error::ParkingError;
use crate::types::{Money, Tariff, TariffId, TariffState};
use chrono::{DateTime, Utc};
use easypark_core::environment::Clock;
use easypark_core::reducer::Reducer;
use easypark_core::{SmallVec, smallvec};
use std::sync::Arc;

/// Commands accepted by the tariff table
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TariffAction {
    /// Add a tariff
    Create {
        /// Price per hour
        hourly: Money,
        /// Optional monthly price
        monthly: Option<Money>,
    },

    /// Change prices. `monthly: Some(None)` clears the monthly price.
    Update {
        /// Tariff to change
        id: TariffId,
        /// New hourly price
        hourly: Option<Money>,
        /// New monthly price
        monthly: Option<Option<Money>>,
    },

    /// Remove a tariff
    Delete {
        /// Tariff to remove
        id: TariffId,
    },
}

/// Facts recorded by the tariff table
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TariffEvent {
    /// A tariff was added
    Created {
        /// The new record
        tariff: Tariff,
    },

    /// Prices changed
    Updated {
        /// Tariff id
        id: TariffId,
        /// New hourly price
        hourly: Money,
        /// New monthly price
        monthly: Option<Money>,
        /// When
        at: DateTime<Utc>,
    },

    /// A tariff was removed
    Deleted {
        /// Tariff id
        id: TariffId,
    },
}

/// Environment dependencies for the tariff table
#[derive(Clone)]
pub struct TariffEnvironment {
    /// Clock for timestamps
    pub clock: Arc<dyn Clock>,
}

impl TariffEnvironment {
    /// Creates a new `TariffEnvironment`
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }
}

/// Reducer for the tariff table
#[derive(Clone, Debug, Default)]
pub struct TariffReducer;

impl TariffReducer {
    /// Creates a new `TariffReducer`
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn validate_prices(hourly: Money, monthly: Option<Money>) -> Result<(), ParkingError> {
        if hourly.is_zero() {
            return Err(ParkingError::Validation(
                "hourly price must be greater than zero".to_string(),
            ));
        }
        if monthly.is_some_and(Money::is_zero) {
            return Err(ParkingError::Validation(
                "monthly price must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    fn apply_event(state: &mut TariffState, event: &TariffEvent) {
        match event {
            TariffEvent::Created { tariff } => {
                state.next_id = state.next_id.max(u64::from(tariff.id.value()) + 1);
                state.tariffs.push(tariff.clone());
            }
            TariffEvent::Updated {
                id,
                hourly,
                monthly,
                at,
            } => {
                if let Some(tariff) = state.tariffs.iter_mut().find(|t| t.id == *id) {
                    tariff.hourly = *hourly;
                    tariff.monthly = *monthly;
                    tariff.updated_at = Some(*at);
                }
            }
            TariffEvent::Deleted { id } => state.tariffs.retain(|t| t.id != *id),
        }
    }
}

impl Reducer for TariffReducer {
    type State = TariffState;
    type Action = TariffAction;
    type Event = TariffEvent;
    type Environment = TariffEnvironment;
    type Error = ParkingError;

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> Result<SmallVec<[TariffEvent; 4]>, ParkingError> {
        let event = match action {
            TariffAction::Create { hourly, monthly } => {
                Self::validate_prices(hourly, monthly)?;
                let id = u32::try_from(state.next_id).map_err(|_| {
                    ParkingError::Conflict("tariff id space exhausted".to_string())
                })?;
                TariffEvent::Created {
                    tariff: Tariff {
                        id: TariffId::new(id),
                        hourly,
                        monthly,
                        created_at: env.clock.now(),
                        updated_at: None,
                    },
                }
            }

            TariffAction::Update {
                id,
                hourly,
                monthly,
            } => {
                let current = state
                    .get(id)
                    .ok_or_else(|| ParkingError::not_found("Tariff", id))?;
                let hourly = hourly.unwrap_or(current.hourly);
                let monthly = monthly.unwrap_or(current.monthly);
                Self::validate_prices(hourly, monthly)?;
                TariffEvent::Updated {
                    id,
                    hourly,
                    monthly,
                    at: env.clock.now(),
                }
            }

            TariffAction::Delete { id } => {
                if state.get(id).is_none() {
                    return Err(ParkingError::not_found("Tariff", id));
                }
                TariffEvent::Deleted { id }
            }
        };

        Self::apply_event(state, &event);
        Ok(smallvec![event])
    }
}
