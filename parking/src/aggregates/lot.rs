//! Parking-lot aggregate.
//!
//! Manages lot metadata and the live available-space counter. The counter
//! always satisfies `0 <= available_spaces <= total_spaces`:
//!
//! - decrementing an empty lot fails with [`CapacityError::NoSpaceAvailable`]
//! - incrementing a full lot is a silent no-op
//! - setting availability above the total fails with [`CapacityError::ExceedsTotal`]
//! - shrinking the total clamps availability down
//!
//! Operator adjustments are ownership-checked; reservation-driven changes
//! (`DecrementAvailable` / `IncrementAvailable`) are not.

use crate::error::{CapacityError, ParkingError};
use crate::geo::haversine_m;
use crate::types::{
    AccountId, Coordinates, LotId, LotKind, LotState, ParkingLot, TariffId, VehicleKind,
    is_time_of_day,
};
use chrono::{DateTime, Utc};
use easypark_core::environment::Clock;
use easypark_core::reducer::Reducer;
use easypark_core::{SmallVec, smallvec};
use std::collections::BTreeSet;
use std::sync::Arc;

// ============================================================================
// Requests
// ============================================================================

/// Fields submitted to create a lot. Every `None` is reported as missing.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LotDraft {
    /// Display name
    pub name: Option<String>,
    /// Street address
    pub address: Option<String>,
    /// Location
    pub coordinates: Option<Coordinates>,
    /// Opening time, `HH:MM`
    pub opens_at: Option<String>,
    /// Closing time, `HH:MM`
    pub closes_at: Option<String>,
    /// Number of spaces, must be positive
    pub total_spaces: Option<u32>,
    /// Price list
    pub tariff_id: Option<TariffId>,
    /// Construction type
    pub kind: Option<LotKind>,
    /// Feature labels
    pub features: BTreeSet<String>,
    /// Only motorcycles may park
    pub motorcycle_only: bool,
    /// Creating account
    pub owner_id: Option<AccountId>,
    /// Optional picture
    pub image_url: Option<String>,
}

/// Partial update of a lot. Id, owner and availability are not patchable.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LotPatch {
    /// New name
    pub name: Option<String>,
    /// New address
    pub address: Option<String>,
    /// New location
    pub coordinates: Option<Coordinates>,
    /// New opening time
    pub opens_at: Option<String>,
    /// New closing time
    pub closes_at: Option<String>,
    /// New total, availability is clamped to it
    pub total_spaces: Option<u32>,
    /// New price list
    pub tariff_id: Option<TariffId>,
    /// New construction type
    pub kind: Option<LotKind>,
    /// Replacement feature set
    pub features: Option<BTreeSet<String>>,
    /// New motorcycle-only flag
    pub motorcycle_only: Option<bool>,
    /// New picture
    pub image_url: Option<String>,
}

/// Direction of a manual availability adjustment
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Adjustment {
    /// One more vehicle parked
    Decrement,
    /// One vehicle left
    Increment,
}

// ============================================================================
// Actions
// ============================================================================

/// Commands accepted by the lot registry
#[derive(Clone, Debug, PartialEq)]
pub enum LotAction {
    /// Register a new lot
    Create {
        /// Submitted fields
        draft: LotDraft,
    },

    /// Patch a lot (owner-checked when a caller is given)
    Update {
        /// Lot to patch
        id: LotId,
        /// Fields to change
        patch: LotPatch,
        /// Acting account
        caller: Option<AccountId>,
    },

    /// Soft-delete a lot (owner-checked when a caller is given)
    SoftDelete {
        /// Lot to deactivate
        id: LotId,
        /// Acting account
        caller: Option<AccountId>,
    },

    /// Administrative activation toggle
    SetActive {
        /// Lot to toggle
        id: LotId,
        /// Desired flag
        active: bool,
    },

    /// Hold one space (reservation-driven)
    DecrementAvailable {
        /// Lot to decrement
        id: LotId,
    },

    /// Release one space (reservation-driven)
    IncrementAvailable {
        /// Lot to increment
        id: LotId,
    },

    /// Manual adjustment by the lot's owner
    Adjust {
        /// Lot to adjust
        id: LotId,
        /// Direction
        direction: Adjustment,
        /// Acting account, must own the lot
        caller: AccountId,
    },

    /// Overwrite the available counter
    SetAvailable {
        /// Lot to set
        id: LotId,
        /// New availability, at most the total
        available: u32,
    },
}

// ============================================================================
// Events
// ============================================================================

/// Facts recorded by the lot registry
#[derive(Clone, Debug, PartialEq)]
pub enum LotEvent {
    /// A lot was registered
    Created {
        /// The new record
        lot: ParkingLot,
    },

    /// Lot metadata changed
    Updated {
        /// Snapshot after the change
        lot: ParkingLot,
    },

    /// A lot was soft-deleted or deactivated
    Deactivated {
        /// Lot id
        id: LotId,
        /// When
        at: DateTime<Utc>,
    },

    /// A lot was re-activated
    Activated {
        /// Lot id
        id: LotId,
        /// When
        at: DateTime<Utc>,
    },

    /// The available counter moved
    AvailabilityChanged {
        /// Lot id
        id: LotId,
        /// New availability
        available: u32,
        /// Lot total
        total: u32,
    },
}

// ============================================================================
// Environment
// ============================================================================

/// Environment dependencies for the lot registry
#[derive(Clone)]
pub struct LotEnvironment {
    /// Clock for timestamps
    pub clock: Arc<dyn Clock>,
}

impl LotEnvironment {
    /// Creates a new `LotEnvironment`
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }
}

// ============================================================================
// Reducer
// ============================================================================

/// Reducer for the lot registry
#[derive(Clone, Debug, Default)]
pub struct LotReducer;

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl LotReducer {
    /// Creates a new `LotReducer`
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Validates `Create`, reporting every missing or invalid field at once
    fn validate_create(
        draft: LotDraft,
        id: LotId,
        now: DateTime<Utc>,
    ) -> Result<ParkingLot, ParkingError> {
        let mut missing = Vec::new();

        let name = non_blank(draft.name);
        if name.is_none() {
            missing.push("name");
        }
        let address = non_blank(draft.address);
        if address.is_none() {
            missing.push("address");
        }
        let coordinates = draft.coordinates.filter(Coordinates::is_valid);
        if coordinates.is_none() {
            missing.push("coordinates");
        }
        let opens_at = draft.opens_at.filter(|t| is_time_of_day(t));
        if opens_at.is_none() {
            missing.push("opening time");
        }
        let closes_at = draft.closes_at.filter(|t| is_time_of_day(t));
        if closes_at.is_none() {
            missing.push("closing time");
        }
        let total_spaces = draft.total_spaces.filter(|n| *n > 0);
        if total_spaces.is_none() {
            missing.push("total spaces");
        }
        if draft.tariff_id.is_none() {
            missing.push("tariff");
        }
        if draft.kind.is_none() {
            missing.push("kind");
        }
        let owner_id = draft.owner_id.filter(|o| !o.as_str().is_empty());
        if owner_id.is_none() {
            missing.push("owner");
        }

        match (
            name,
            address,
            coordinates,
            opens_at,
            closes_at,
            total_spaces,
            draft.kind,
            owner_id,
        ) {
            (
                Some(name),
                Some(address),
                Some(coordinates),
                Some(opens_at),
                Some(closes_at),
                Some(total_spaces),
                Some(kind),
                Some(owner_id),
            ) if missing.is_empty() => Ok(ParkingLot {
                id,
                name,
                address,
                coordinates,
                opens_at,
                closes_at,
                total_spaces,
                available_spaces: total_spaces,
                tariff_id: draft.tariff_id,
                kind,
                features: draft.features,
                motorcycle_only: draft.motorcycle_only,
                active: true,
                owner_id,
                image_url: non_blank(draft.image_url),
                created_at: now,
                updated_at: None,
                deactivated_at: None,
            }),
            _ => Err(ParkingError::Validation(format!(
                "missing or invalid fields: {}",
                missing.join(", ")
            ))),
        }
    }

    /// Ownership check, skipped when no caller is given
    fn check_owner(lot: &ParkingLot, caller: Option<&AccountId>) -> Result<(), ParkingError> {
        match caller {
            Some(caller) if caller.as_str() != lot.owner_id.as_str() => {
                Err(ParkingError::PermissionDenied {
                    lot_id: lot.id,
                    caller: caller.clone(),
                })
            }
            _ => Ok(()),
        }
    }

    /// Applies a patch to a copy of the lot, validating every field it touches
    fn patched(
        lot: &ParkingLot,
        patch: LotPatch,
        now: DateTime<Utc>,
    ) -> Result<ParkingLot, ParkingError> {
        let mut invalid = Vec::new();
        let mut next = lot.clone();

        if let Some(name) = patch.name {
            match non_blank(Some(name)) {
                Some(name) => next.name = name,
                None => invalid.push("name"),
            }
        }
        if let Some(address) = patch.address {
            match non_blank(Some(address)) {
                Some(address) => next.address = address,
                None => invalid.push("address"),
            }
        }
        if let Some(coordinates) = patch.coordinates {
            if coordinates.is_valid() {
                next.coordinates = coordinates;
            } else {
                invalid.push("coordinates");
            }
        }
        if let Some(opens_at) = patch.opens_at {
            if is_time_of_day(&opens_at) {
                next.opens_at = opens_at;
            } else {
                invalid.push("opening time");
            }
        }
        if let Some(closes_at) = patch.closes_at {
            if is_time_of_day(&closes_at) {
                next.closes_at = closes_at;
            } else {
                invalid.push("closing time");
            }
        }
        if let Some(total) = patch.total_spaces {
            if total > 0 {
                next.total_spaces = total;
                next.available_spaces = next.available_spaces.min(total);
            } else {
                invalid.push("total spaces");
            }
        }
        if let Some(tariff_id) = patch.tariff_id {
            next.tariff_id = Some(tariff_id);
        }
        if let Some(kind) = patch.kind {
            next.kind = kind;
        }
        if let Some(features) = patch.features {
            next.features = features;
        }
        if let Some(motorcycle_only) = patch.motorcycle_only {
            next.motorcycle_only = motorcycle_only;
        }
        if let Some(image_url) = patch.image_url {
            next.image_url = non_blank(Some(image_url));
        }

        if !invalid.is_empty() {
            return Err(ParkingError::Validation(format!(
                "invalid fields: {}",
                invalid.join(", ")
            )));
        }

        next.updated_at = Some(now);
        Ok(next)
    }

    fn lot(state: &LotState, id: LotId) -> Result<&ParkingLot, ParkingError> {
        state.get(id).ok_or_else(|| ParkingError::not_found("Parking lot", id))
    }

    fn availability(lot: &ParkingLot, available: u32) -> LotEvent {
        LotEvent::AvailabilityChanged {
            id: lot.id,
            available,
            total: lot.total_spaces,
        }
    }

    fn decrement(lot: &ParkingLot) -> Result<LotEvent, ParkingError> {
        if lot.available_spaces == 0 {
            return Err(CapacityError::NoSpaceAvailable { lot_id: lot.id }.into());
        }
        Ok(Self::availability(lot, lot.available_spaces - 1))
    }

    fn increment(lot: &ParkingLot) -> Option<LotEvent> {
        (lot.available_spaces < lot.total_spaces)
            .then(|| Self::availability(lot, lot.available_spaces + 1))
    }

    /// Applies an event to state
    fn apply_event(state: &mut LotState, event: &LotEvent) {
        match event {
            LotEvent::Created { lot } => {
                state.next_id = state.next_id.max(u64::from(lot.id.value()) + 1);
                state.lots.push(lot.clone());
            }
            LotEvent::Updated { lot } => {
                if let Some(existing) = state.get_mut(lot.id) {
                    *existing = lot.clone();
                }
            }
            LotEvent::Deactivated { id, at } => {
                if let Some(lot) = state.get_mut(*id) {
                    lot.active = false;
                    lot.deactivated_at = Some(*at);
                    lot.updated_at = Some(*at);
                }
            }
            LotEvent::Activated { id, at } => {
                if let Some(lot) = state.get_mut(*id) {
                    lot.active = true;
                    lot.deactivated_at = None;
                    lot.updated_at = Some(*at);
                }
            }
            LotEvent::AvailabilityChanged { id, available, .. } => {
                if let Some(lot) = state.get_mut(*id) {
                    lot.available_spaces = (*available).min(lot.total_spaces);
                }
            }
        }
    }
}

impl Reducer for LotReducer {
    type State = LotState;
    type Action = LotAction;
    type Event = LotEvent;
    type Environment = LotEnvironment;
    type Error = ParkingError;

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> Result<SmallVec<[LotEvent; 4]>, ParkingError> {
        let event = match action {
            LotAction::Create { draft } => {
                let id = u32::try_from(state.next_id).map_err(|_| {
                    ParkingError::Conflict("parking lot id space exhausted".to_string())
                })?;
                LotEvent::Created {
                    lot: Self::validate_create(draft, LotId::new(id), env.clock.now())?,
                }
            }

            LotAction::Update { id, patch, caller } => {
                let lot = Self::lot(state, id)?;
                Self::check_owner(lot, caller.as_ref())?;
                LotEvent::Updated {
                    lot: Self::patched(lot, patch, env.clock.now())?,
                }
            }

            LotAction::SoftDelete { id, caller } => {
                let lot = Self::lot(state, id)?;
                Self::check_owner(lot, caller.as_ref())?;
                if !lot.active {
                    return Ok(SmallVec::new());
                }
                LotEvent::Deactivated {
                    id,
                    at: env.clock.now(),
                }
            }

            LotAction::SetActive { id, active } => {
                let lot = Self::lot(state, id)?;
                if lot.active == active {
                    return Ok(SmallVec::new());
                }
                let at = env.clock.now();
                if active {
                    LotEvent::Activated { id, at }
                } else {
                    LotEvent::Deactivated { id, at }
                }
            }

            LotAction::DecrementAvailable { id } => Self::decrement(Self::lot(state, id)?)?,

            LotAction::IncrementAvailable { id } => {
                match Self::increment(Self::lot(state, id)?) {
                    Some(event) => event,
                    None => return Ok(SmallVec::new()),
                }
            }

            LotAction::Adjust {
                id,
                direction,
                caller,
            } => {
                let lot = Self::lot(state, id)?;
                Self::check_owner(lot, Some(&caller))?;
                match direction {
                    Adjustment::Decrement => Self::decrement(lot)?,
                    Adjustment::Increment => match Self::increment(lot) {
                        Some(event) => event,
                        None => return Ok(SmallVec::new()),
                    },
                }
            }

            LotAction::SetAvailable { id, available } => {
                let lot = Self::lot(state, id)?;
                if available > lot.total_spaces {
                    return Err(CapacityError::ExceedsTotal {
                        lot_id: id,
                        requested: available,
                        total: lot.total_spaces,
                    }
                    .into());
                }
                Self::availability(lot, available)
            }
        };

        Self::apply_event(state, &event);
        Ok(smallvec![event])
    }
}

// ============================================================================
// Queries
// ============================================================================

/// Public lot search. Every criterion set must hold.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LotQuery {
    /// Also return soft-deleted lots
    pub include_inactive: bool,
    /// Motorcycles only match motorcycle-only lots, cars only the others
    pub vehicle: Option<VehicleKind>,
    /// Case-insensitive substring of name or address
    pub text: Option<String>,
    /// At least one free space right now
    pub available_now: bool,
    /// Allowed construction types (empty allows all)
    pub kinds: Vec<LotKind>,
    /// Features that must all be present
    pub features: BTreeSet<String>,
    /// Caller location, enables distance annotation and sorting
    pub near: Option<Coordinates>,
    /// Maximum distance from `near`, in meters
    pub radius_m: Option<f64>,
}

impl LotQuery {
    /// Adds a required feature
    #[must_use]
    pub fn requiring(mut self, feature: &str) -> Self {
        self.features.insert(feature.to_string());
        self
    }

    fn matches(&self, lot: &ParkingLot) -> bool {
        if !self.include_inactive && !lot.active {
            return false;
        }
        if self.vehicle.is_some_and(|v| !lot.accepts(v)) {
            return false;
        }
        if let Some(text) = self.text.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
            let needle = text.to_lowercase();
            if !lot.name.to_lowercase().contains(&needle)
                && !lot.address.to_lowercase().contains(&needle)
            {
                return false;
            }
        }
        if self.available_now && lot.available_spaces == 0 {
            return false;
        }
        if !self.kinds.is_empty() && !self.kinds.contains(&lot.kind) {
            return false;
        }
        self.features.iter().all(|f| lot.has_feature(f))
    }

    /// Runs the query over a collection
    ///
    /// With a caller location every match carries its distance and results
    /// are sorted nearest first; otherwise storage order is kept.
    #[must_use]
    pub fn run(&self, lots: &[ParkingLot]) -> Vec<LotMatch> {
        let mut matches: Vec<LotMatch> = lots
            .iter()
            .filter(|lot| self.matches(lot))
            .filter_map(|lot| {
                let distance_m = self.near.map(|origin| haversine_m(origin, lot.coordinates));
                match (distance_m, self.radius_m) {
                    (Some(d), Some(radius)) if d > radius => None,
                    _ => Some(LotMatch {
                        lot: lot.clone(),
                        distance_m,
                    }),
                }
            })
            .collect();

        if self.near.is_some() {
            matches.sort_by(|a, b| {
                a.distance_m
                    .unwrap_or(f64::INFINITY)
                    .total_cmp(&b.distance_m.unwrap_or(f64::INFINITY))
            });
        }
        matches
    }
}

/// A lot returned by [`LotQuery::run`]
#[derive(Clone, Debug, PartialEq)]
pub struct LotMatch {
    /// The lot
    pub lot: ParkingLot,
    /// Distance from the caller, when a location was given
    pub distance_m: Option<f64>,
}

/// Occupancy band of a lot
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Occupancy {
    /// No free space
    Full,
    /// Five free spaces or fewer
    AlmostFull,
    /// More than five free spaces
    Available,
}

/// Occupancy figures of one lot
#[derive(Clone, Debug, PartialEq)]
pub struct LotStatistics {
    /// Lot id
    pub id: LotId,
    /// Lot name
    pub name: String,
    /// Total spaces
    pub total: u32,
    /// Spaces in use
    pub occupied: u32,
    /// Free spaces
    pub available: u32,
    /// Occupied share, percent with two decimals
    pub occupancy_percent: f64,
    /// Occupancy band
    pub status: Occupancy,
}

impl LotStatistics {
    /// Free spaces at or below which a lot counts as almost full
    pub const ALMOST_FULL: u32 = 5;

    /// Computes the figures for a lot
    #[must_use]
    pub fn of(lot: &ParkingLot) -> Self {
        let occupied = lot.occupied_spaces();
        let occupancy_percent = if lot.total_spaces == 0 {
            0.0
        } else {
            (f64::from(occupied) / f64::from(lot.total_spaces) * 10_000.0).round() / 100.0
        };
        let status = match lot.available_spaces {
            0 => Occupancy::Full,
            n if n <= Self::ALMOST_FULL => Occupancy::AlmostFull,
            _ => Occupancy::Available,
        };

        Self {
            id: lot.id,
            name: lot.name.clone(),
            total: lot.total_spaces,
            occupied,
            available: lot.available_spaces,
            occupancy_percent,
            status,
        }
    }
}

impl LotState {
    /// Active lots created by `owner`, optionally narrowed by text and kind
    #[must_use]
    pub fn owned_by(
        &self,
        owner: &AccountId,
        text: Option<&str>,
        kind: Option<LotKind>,
    ) -> Vec<&ParkingLot> {
        let needle = text.map(|t| t.trim().to_lowercase()).unwrap_or_default();
        self.lots
            .iter()
            .filter(|l| l.active && l.owner_id.as_str() == owner.as_str())
            .filter(|l| {
                needle.is_empty()
                    || l.name.to_lowercase().contains(&needle)
                    || l.address.to_lowercase().contains(&needle)
            })
            .filter(|l| kind.is_none_or(|k| l.kind == k))
            .collect()
    }

    /// Administrative listing by activation flag and kind
    #[must_use]
    pub fn admin_list(&self, active: Option<bool>, kind: Option<LotKind>) -> Vec<&ParkingLot> {
        self.lots
            .iter()
            .filter(|l| active.is_none_or(|a| l.active == a))
            .filter(|l| kind.is_none_or(|k| l.kind == k))
            .collect()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::types::features;
    use easypark_testing::{ReducerTest, test_clock};

    fn env() -> LotEnvironment {
        LotEnvironment::new(Arc::new(test_clock()))
    }

    fn draft(name: &str, total: u32) -> LotDraft {
        LotDraft {
            name: Some(name.to_string()),
            address: Some("Calle 21 #15-30, Armenia".to_string()),
            coordinates: Some(Coordinates::new(4.5339, -75.6811)),
            opens_at: Some("06:00".to_string()),
            closes_at: Some("22:00".to_string()),
            total_spaces: Some(total),
            tariff_id: Some(TariffId::new(1)),
            kind: Some(LotKind::Covered),
            owner_id: Some(AccountId::from("2")),
            ..LotDraft::default()
        }
    }

    fn state_with_lot(total: u32, available: u32) -> LotState {
        let mut state = LotState::new(Vec::new(), 1);
        LotReducer::new()
            .reduce(&mut state, LotAction::Create { draft: draft("Centro", total) }, &env())
            .unwrap();
        state.lots[0].available_spaces = available;
        state
    }

    #[test]
    fn test_create_starts_full_and_active() {
        ReducerTest::new(LotReducer::new())
            .with_env(env())
            .given_state(LotState::new(Vec::new(), 7))
            .when_action(LotAction::Create {
                draft: draft("Nuevo", 40),
            })
            .then_state(|state| {
                let lot = &state.lots[0];
                assert_eq!(lot.id, LotId::new(7));
                assert_eq!(lot.available_spaces, 40);
                assert!(lot.active);
                assert_eq!(state.next_id, 8);
            })
            .then_events(|events| assert!(matches!(events, [LotEvent::Created { .. }])))
            .run();
    }

    #[test]
    fn test_create_lists_every_missing_field() {
        ReducerTest::new(LotReducer::new())
            .with_env(env())
            .given_state(LotState::new(Vec::new(), 1))
            .when_action(LotAction::Create {
                draft: LotDraft {
                    name: Some("Sin datos".to_string()),
                    total_spaces: Some(0),
                    opens_at: Some("6am".to_string()),
                    ..LotDraft::default()
                },
            })
            .then_state(|state| assert_eq!(state.count(), 0))
            .then_error(|error| {
                assert_eq!(
                    error.to_string(),
                    "Validation failed: missing or invalid fields: address, coordinates, \
                     opening time, closing time, total spaces, tariff, kind, owner"
                );
            })
            .run();
    }

    #[test]
    fn test_decrement_empty_lot_fails() {
        ReducerTest::new(LotReducer::new())
            .with_env(env())
            .given_state(state_with_lot(10, 0))
            .when_action(LotAction::DecrementAvailable { id: LotId::new(1) })
            .then_state(|state| assert_eq!(state.lots[0].available_spaces, 0))
            .then_error(|error| {
                assert!(matches!(
                    error,
                    ParkingError::Capacity(CapacityError::NoSpaceAvailable { .. })
                ));
            })
            .run();
    }

    #[test]
    fn test_increment_full_lot_is_noop() {
        ReducerTest::new(LotReducer::new())
            .with_env(env())
            .given_state(state_with_lot(10, 10))
            .when_action(LotAction::IncrementAvailable { id: LotId::new(1) })
            .then_state(|state| assert_eq!(state.lots[0].available_spaces, 10))
            .then_events(|events| assert!(events.is_empty()))
            .run();
    }

    #[test]
    fn test_adjust_checks_owner() {
        ReducerTest::new(LotReducer::new())
            .with_env(env())
            .given_state(state_with_lot(10, 5))
            .when_action(LotAction::Adjust {
                id: LotId::new(1),
                direction: Adjustment::Decrement,
                caller: AccountId::from("1"),
            })
            .then_state(|state| assert_eq!(state.lots[0].available_spaces, 5))
            .then_error(|error| {
                assert!(matches!(error, ParkingError::PermissionDenied { .. }));
            })
            .run();
    }

    #[test]
    fn test_adjust_by_owner() {
        ReducerTest::new(LotReducer::new())
            .with_env(env())
            .given_state(state_with_lot(10, 5))
            .when_action(LotAction::Adjust {
                id: LotId::new(1),
                direction: Adjustment::Increment,
                caller: AccountId::from(2_u64),
            })
            .then_state(|state| assert_eq!(state.lots[0].available_spaces, 6))
            .then_events(|events| {
                assert_eq!(
                    events,
                    [LotEvent::AvailabilityChanged {
                        id: LotId::new(1),
                        available: 6,
                        total: 10,
                    }]
                );
            })
            .run();
    }

    #[test]
    fn test_set_available_above_total() {
        ReducerTest::new(LotReducer::new())
            .with_env(env())
            .given_state(state_with_lot(10, 5))
            .when_action(LotAction::SetAvailable {
                id: LotId::new(1),
                available: 11,
            })
            .then_error(|error| {
                assert!(matches!(
                    error,
                    ParkingError::Capacity(CapacityError::ExceedsTotal {
                        requested: 11,
                        total: 10,
                        ..
                    })
                ));
            })
            .run();
    }

    #[test]
    fn test_update_shrinking_total_clamps_availability() {
        ReducerTest::new(LotReducer::new())
            .with_env(env())
            .given_state(state_with_lot(10, 8))
            .when_action(LotAction::Update {
                id: LotId::new(1),
                patch: LotPatch {
                    total_spaces: Some(4),
                    ..LotPatch::default()
                },
                caller: Some(AccountId::from("2")),
            })
            .then_state(|state| {
                assert_eq!(state.lots[0].total_spaces, 4);
                assert_eq!(state.lots[0].available_spaces, 4);
                assert!(state.lots[0].updated_at.is_some());
            })
            .then_events(|events| assert_eq!(events.len(), 1))
            .run();
    }

    #[test]
    fn test_update_by_stranger_is_denied() {
        ReducerTest::new(LotReducer::new())
            .with_env(env())
            .given_state(state_with_lot(10, 8))
            .when_action(LotAction::Update {
                id: LotId::new(1),
                patch: LotPatch {
                    name: Some("Robado".to_string()),
                    ..LotPatch::default()
                },
                caller: Some(AccountId::from("9")),
            })
            .then_state(|state| assert_eq!(state.lots[0].name, "Centro"))
            .then_error(|error| {
                assert!(matches!(error, ParkingError::PermissionDenied { .. }));
            })
            .run();
    }

    #[test]
    fn test_soft_delete_keeps_the_record() {
        ReducerTest::new(LotReducer::new())
            .with_env(env())
            .given_state(state_with_lot(10, 8))
            .when_action(LotAction::SoftDelete {
                id: LotId::new(1),
                caller: None,
            })
            .then_state(|state| {
                assert_eq!(state.count(), 1);
                assert!(!state.lots[0].active);
                assert!(state.lots[0].deactivated_at.is_some());
                assert!(state.get_active(LotId::new(1)).is_none());
            })
            .then_events(|events| assert!(matches!(events, [LotEvent::Deactivated { .. }])))
            .run();
    }

    #[test]
    fn test_unknown_lot() {
        ReducerTest::new(LotReducer::new())
            .with_env(env())
            .given_state(LotState::default())
            .when_action(LotAction::IncrementAvailable { id: LotId::new(42) })
            .then_error(|error| assert!(matches!(error, ParkingError::NotFound { .. })))
            .run();
    }

    fn sample_lots() -> Vec<ParkingLot> {
        let mut state = LotState::new(Vec::new(), 1);
        let reducer = LotReducer::new();
        let env = env();

        let mut near = draft("Parqueadero Centro", 50);
        near.features = [features::SECURITY_24_7.to_string()].into();
        reducer.reduce(&mut state, LotAction::Create { draft: near }, &env).unwrap();

        let mut far = draft("Garaje Norte", 20);
        far.address = Some("Avenida Bolivar, Armenia".to_string());
        far.coordinates = Some(Coordinates::new(4.5600, -75.6600));
        far.kind = Some(LotKind::Garage);
        far.features = [features::SECURITY_24_7.to_string(), features::EV_CHARGING.to_string()]
            .into();
        reducer.reduce(&mut state, LotAction::Create { draft: far }, &env).unwrap();

        let mut motos = draft("Motos Express", 30);
        motos.coordinates = Some(Coordinates::new(4.5345, -75.6815));
        motos.motorcycle_only = true;
        reducer.reduce(&mut state, LotAction::Create { draft: motos }, &env).unwrap();

        state.lots[1].available_spaces = 0;
        state.lots
    }

    #[test]
    fn test_query_vehicle_kind() {
        let lots = sample_lots();
        let motos = LotQuery {
            vehicle: Some(VehicleKind::Motorcycle),
            ..LotQuery::default()
        }
        .run(&lots);
        assert_eq!(motos.len(), 1);
        assert_eq!(motos[0].lot.name, "Motos Express");

        let cars = LotQuery {
            vehicle: Some(VehicleKind::Car),
            ..LotQuery::default()
        }
        .run(&lots);
        assert_eq!(cars.len(), 2);
    }

    #[test]
    fn test_query_text_availability_kind_features() {
        let lots = sample_lots();
        let by_text = LotQuery {
            text: Some("bolivar".to_string()),
            ..LotQuery::default()
        }
        .run(&lots);
        assert_eq!(by_text.len(), 1);

        let available = LotQuery {
            available_now: true,
            ..LotQuery::default()
        }
        .run(&lots);
        assert_eq!(available.len(), 2);

        let garages = LotQuery {
            kinds: vec![LotKind::Garage],
            ..LotQuery::default()
        }
        .run(&lots);
        assert_eq!(garages.len(), 1);

        let secure_ev = LotQuery::default()
            .requiring(features::SECURITY_24_7)
            .requiring(features::EV_CHARGING)
            .run(&lots);
        assert_eq!(secure_ev.len(), 1);
        assert_eq!(secure_ev[0].lot.name, "Garaje Norte");
    }

    #[test]
    fn test_query_radius_sorts_by_distance() {
        let lots = sample_lots();
        let origin = Coordinates::new(4.5346, -75.6816);

        let all = LotQuery {
            near: Some(origin),
            ..LotQuery::default()
        }
        .run(&lots);
        let names: Vec<_> = all.iter().map(|m| m.lot.name.as_str()).collect();
        assert_eq!(names, ["Motos Express", "Parqueadero Centro", "Garaje Norte"]);
        assert!(all.iter().all(|m| m.distance_m.is_some()));

        let close = LotQuery {
            near: Some(origin),
            radius_m: Some(1_000.0),
            ..LotQuery::default()
        }
        .run(&lots);
        assert_eq!(close.len(), 2);
    }

    #[test]
    fn test_query_hides_inactive() {
        let mut lots = sample_lots();
        lots[0].active = false;
        assert_eq!(LotQuery::default().run(&lots).len(), 2);
        assert_eq!(
            LotQuery {
                include_inactive: true,
                ..LotQuery::default()
            }
            .run(&lots)
            .len(),
            3
        );
    }

    #[test]
    fn test_statistics_bands() {
        let mut lot = sample_lots().remove(0);
        lot.total_spaces = 3;
        lot.available_spaces = 0;
        let stats = LotStatistics::of(&lot);
        assert_eq!(stats.status, Occupancy::Full);
        assert!((stats.occupancy_percent - 100.0).abs() < f64::EPSILON);

        lot.available_spaces = 1;
        let stats = LotStatistics::of(&lot);
        assert_eq!(stats.status, Occupancy::AlmostFull);
        assert_eq!(stats.occupied, 2);
        assert!((stats.occupancy_percent - 66.67).abs() < 1e-9);

        lot.total_spaces = 50;
        lot.available_spaces = 6;
        assert_eq!(LotStatistics::of(&lot).status, Occupancy::Available);
    }

    #[test]
    fn test_owner_and_admin_listings() {
        let mut state = LotState::new(sample_lots(), 4);
        state.lots[2].owner_id = AccountId::from("5");
        state.lots[0].active = false;

        assert_eq!(state.owned_by(&AccountId::from("2"), None, None).len(), 1);
        assert_eq!(
            state
                .owned_by(&AccountId::from("2"), Some("garaje"), Some(LotKind::Garage))
                .len(),
            1
        );
        assert_eq!(state.admin_list(Some(false), None).len(), 1);
        assert_eq!(state.admin_list(None, Some(LotKind::Covered)).len(), 2);
    }
}
