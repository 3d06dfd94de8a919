//! Aggregate services - command handlers over persisted collections.
//!
//! Every service call follows the same steps:
//! 1. Wait out the simulated network latency
//! 2. Load the collection (seed fallback on unreadable storage)
//! 3. Execute the reducer with the command
//! 4. Write the collection back when the command was accepted
//! 5. Return the recorded events

use crate::aggregates::account::AccountEnvironment;
use crate::aggregates::lot::{LotEnvironment, LotMatch};
use crate::aggregates::reservation::ReservationEnvironment;
use crate::aggregates::tariff::TariffEnvironment;
use crate::aggregates::{
    AccountAction, AccountEvent, AccountFilter, AccountReducer, LotAction, LotEvent, LotQuery,
    LotReducer, LotStatistics, ReservationAction, ReservationEvent, ReservationFilter,
    ReservationReducer, TariffAction, TariffEvent, TariffReducer,
};
use crate::error::{ParkingError, Result};
use crate::repository::Collection;
use crate::types::{
    Account, AccountId, AccountState, LotId, LotKind, LotState, ParkingLot, Reservation,
    ReservationId, ReservationState, Tariff, TariffId, TariffState,
};
use easypark_core::SmallVec;
use easypark_core::reducer::Reducer;
use std::sync::Arc;
use std::time::Duration;

pub(crate) async fn simulate_latency(latency: Duration) {
    if !latency.is_zero() {
        tokio::time::sleep(latency).await;
    }
}

/// Reservation ledger service
pub struct ReservationService {
    collection: Arc<Collection<ReservationState>>,
    reducer: ReservationReducer,
    env: ReservationEnvironment,
    latency: Duration,
}

impl ReservationService {
    /// Create a new reservation service
    #[must_use]
    pub fn new(
        collection: Arc<Collection<ReservationState>>,
        env: ReservationEnvironment,
        latency: Duration,
    ) -> Self {
        Self {
            collection,
            reducer: ReservationReducer::new(),
            env,
            latency,
        }
    }

    /// Handle a reservation command
    ///
    /// # Errors
    ///
    /// Returns the reducer's rejection, or a storage error when saving fails.
    pub async fn handle(
        &self,
        action: ReservationAction,
    ) -> Result<SmallVec<[ReservationEvent; 4]>> {
        simulate_latency(self.latency).await;
        let events = self
            .collection
            .mutate(|state| self.reducer.reduce(state, action, &self.env))
            .await?;

        tracing::debug!(events = events.len(), "Reservation command handled");
        Ok(events)
    }

    /// Reservation by id
    ///
    /// # Errors
    ///
    /// Returns [`ParkingError::NotFound`] when the id is unknown.
    pub async fn get(&self, id: ReservationId) -> Result<Reservation> {
        simulate_latency(self.latency).await;
        self.collection
            .read(|state| state.get(id).cloned())
            .await
            .ok_or_else(|| ParkingError::not_found("Reservation", id))
    }

    /// Reservation by code, case-insensitive
    ///
    /// # Errors
    ///
    /// Returns [`ParkingError::NotFound`] when no reservation has the code.
    pub async fn find_by_code(&self, code: &str) -> Result<Reservation> {
        simulate_latency(self.latency).await;
        self.collection
            .read(|state| state.find_by_code(code).cloned())
            .await
            .ok_or_else(|| ParkingError::not_found("Reservation", code.trim()))
    }

    /// Every reservation of an account, in storage order
    pub async fn list_by_account(&self, account: &AccountId) -> Vec<Reservation> {
        simulate_latency(self.latency).await;
        self.collection
            .read(|state| state.by_account(account).into_iter().cloned().collect())
            .await
    }

    /// Operator listing
    pub async fn list(&self, filter: &ReservationFilter) -> Vec<Reservation> {
        simulate_latency(self.latency).await;
        self.collection
            .read(|state| {
                state
                    .reservations
                    .iter()
                    .filter(|r| filter.matches(r))
                    .cloned()
                    .collect()
            })
            .await
    }
}

/// Parking-lot registry service
pub struct LotService {
    collection: Arc<Collection<LotState>>,
    reducer: LotReducer,
    env: LotEnvironment,
    latency: Duration,
}

impl LotService {
    /// Create a new lot service
    #[must_use]
    pub fn new(collection: Arc<Collection<LotState>>, env: LotEnvironment, latency: Duration) -> Self {
        Self {
            collection,
            reducer: LotReducer::new(),
            env,
            latency,
        }
    }

    /// Handle a lot command
    ///
    /// # Errors
    ///
    /// Returns the reducer's rejection, or a storage error when saving fails.
    pub async fn handle(&self, action: LotAction) -> Result<SmallVec<[LotEvent; 4]>> {
        simulate_latency(self.latency).await;
        let events = self
            .collection
            .mutate(|state| self.reducer.reduce(state, action, &self.env))
            .await?;

        tracing::debug!(events = events.len(), "Lot command handled");
        Ok(events)
    }

    /// Handle a command, then return the lot it touched
    ///
    /// # Errors
    ///
    /// Same as [`Self::handle`].
    pub async fn handle_and_get(&self, id: LotId, action: LotAction) -> Result<ParkingLot> {
        simulate_latency(self.latency).await;
        self.collection
            .mutate(|state| {
                let events = self.reducer.reduce(state, action, &self.env)?;
                tracing::debug!(lot_id = %id, events = events.len(), "Lot command handled");
                state
                    .get(id)
                    .cloned()
                    .ok_or_else(|| ParkingError::not_found("Parking lot", id))
            })
            .await
    }

    /// Active lot by id
    ///
    /// # Errors
    ///
    /// Returns [`ParkingError::NotFound`] for unknown or deactivated lots.
    pub async fn get_active(&self, id: LotId) -> Result<ParkingLot> {
        simulate_latency(self.latency).await;
        self.collection
            .read(|state| state.get_active(id).cloned())
            .await
            .ok_or_else(|| ParkingError::not_found("Parking lot", id))
    }

    /// Lot by id, active or not
    ///
    /// # Errors
    ///
    /// Returns [`ParkingError::NotFound`] for unknown lots.
    pub async fn get_any(&self, id: LotId) -> Result<ParkingLot> {
        simulate_latency(self.latency).await;
        self.collection
            .read(|state| state.get(id).cloned())
            .await
            .ok_or_else(|| ParkingError::not_found("Parking lot", id))
    }

    /// Public search
    pub async fn search(&self, query: &LotQuery) -> Vec<LotMatch> {
        simulate_latency(self.latency).await;
        self.collection.read(|state| query.run(&state.lots)).await
    }

    /// Lots of one owner
    pub async fn owned_by(
        &self,
        owner: &AccountId,
        text: Option<&str>,
        kind: Option<LotKind>,
    ) -> Vec<ParkingLot> {
        simulate_latency(self.latency).await;
        self.collection
            .read(|state| state.owned_by(owner, text, kind).into_iter().cloned().collect())
            .await
    }

    /// Administrative listing
    pub async fn admin_list(&self, active: Option<bool>, kind: Option<LotKind>) -> Vec<ParkingLot> {
        simulate_latency(self.latency).await;
        self.collection
            .read(|state| state.admin_list(active, kind).into_iter().cloned().collect())
            .await
    }

    /// Occupancy figures of a lot
    ///
    /// # Errors
    ///
    /// Returns [`ParkingError::NotFound`] for unknown lots.
    pub async fn statistics(&self, id: LotId) -> Result<LotStatistics> {
        self.get_any(id).await.map(|lot| LotStatistics::of(&lot))
    }
}

/// Tariff table service
pub struct TariffService {
    collection: Arc<Collection<TariffState>>,
    reducer: TariffReducer,
    env: TariffEnvironment,
    latency: Duration,
}

impl TariffService {
    /// Create a new tariff service
    #[must_use]
    pub fn new(
        collection: Arc<Collection<TariffState>>,
        env: TariffEnvironment,
        latency: Duration,
    ) -> Self {
        Self {
            collection,
            reducer: TariffReducer::new(),
            env,
            latency,
        }
    }

    /// Handle a tariff command
    ///
    /// # Errors
    ///
    /// Returns the reducer's rejection, or a storage error when saving fails.
    pub async fn handle(&self, action: TariffAction) -> Result<SmallVec<[TariffEvent; 4]>> {
        simulate_latency(self.latency).await;
        let events = self
            .collection
            .mutate(|state| self.reducer.reduce(state, action, &self.env))
            .await?;

        tracing::debug!(events = events.len(), "Tariff command handled");
        Ok(events)
    }

    /// Tariff by id
    ///
    /// # Errors
    ///
    /// Returns [`ParkingError::NotFound`] when the id is unknown.
    pub async fn get(&self, id: TariffId) -> Result<Tariff> {
        simulate_latency(self.latency).await;
        self.find(id)
            .await
            .ok_or_else(|| ParkingError::not_found("Tariff", id))
    }

    /// Tariff by id without latency, for cross-collection checks
    pub(crate) async fn find(&self, id: TariffId) -> Option<Tariff> {
        self.collection.read(|state| state.get(id).cloned()).await
    }

    /// Every tariff
    pub async fn list(&self) -> Vec<Tariff> {
        simulate_latency(self.latency).await;
        self.collection.read(|state| state.tariffs.clone()).await
    }
}

/// Account directory service
pub struct AccountService {
    collection: Arc<Collection<AccountState>>,
    reducer: AccountReducer,
    env: AccountEnvironment,
    latency: Duration,
}

impl AccountService {
    /// Create a new account service
    #[must_use]
    pub fn new(
        collection: Arc<Collection<AccountState>>,
        env: AccountEnvironment,
        latency: Duration,
    ) -> Self {
        Self {
            collection,
            reducer: AccountReducer::new(),
            env,
            latency,
        }
    }

    /// Handle a command, then return the account it touched
    ///
    /// Registration reads the new account id from the recorded event.
    ///
    /// # Errors
    ///
    /// Returns the reducer's rejection, or a storage error when saving fails.
    pub async fn handle(&self, action: AccountAction) -> Result<Account> {
        simulate_latency(self.latency).await;
        let target = match &action {
            AccountAction::Register { .. } => None,
            AccountAction::UpdateProfile { id, .. }
            | AccountAction::AddVehicle { id, .. }
            | AccountAction::RemoveVehicle { id, .. }
            | AccountAction::SetActive { id, .. }
            | AccountAction::SetVerified { id, .. } => Some(id.clone()),
        };

        self.collection
            .mutate(|state| {
                let events = self.reducer.reduce(state, action, &self.env)?;
                tracing::debug!(events = events.len(), "Account command handled");

                let id = target.or_else(|| {
                    events.iter().find_map(|event| match event {
                        AccountEvent::Registered { account } => Some(account.id.clone()),
                        _ => None,
                    })
                });
                id.as_ref()
                    .and_then(|id| state.get(id).cloned())
                    .ok_or_else(|| ParkingError::not_found("Account", "new account"))
            })
            .await
    }

    /// Account by id, active or not
    ///
    /// # Errors
    ///
    /// Returns [`ParkingError::NotFound`] when the id is unknown.
    pub async fn get(&self, id: &AccountId) -> Result<Account> {
        simulate_latency(self.latency).await;
        self.find(id)
            .await
            .ok_or_else(|| ParkingError::not_found("Account", id))
    }

    /// Account by id without latency, for cross-collection checks
    pub(crate) async fn find(&self, id: &AccountId) -> Option<Account> {
        self.collection.read(|state| state.get(id).cloned()).await
    }

    /// Active account by email
    ///
    /// # Errors
    ///
    /// Returns [`ParkingError::NotFound`] when no active account has the email.
    pub async fn get_by_email(&self, email: &str) -> Result<Account> {
        simulate_latency(self.latency).await;
        self.collection
            .read(|state| state.active_by_email(email).cloned())
            .await
            .ok_or_else(|| ParkingError::not_found("Account", email.trim()))
    }

    /// Administrative listing
    pub async fn list(&self, filter: &AccountFilter) -> Vec<Account> {
        simulate_latency(self.latency).await;
        self.collection
            .read(|state| {
                state
                    .accounts
                    .iter()
                    .filter(|a| filter.matches(a))
                    .cloned()
                    .collect()
            })
            .await
    }

    /// Checks credentials
    ///
    /// # Errors
    ///
    /// See [`AccountState::authenticate`].
    pub async fn authenticate(&self, email: &str, password: &str) -> Result<Account> {
        simulate_latency(self.latency).await;
        self.collection
            .read(|state| state.authenticate(email, password).cloned())
            .await
    }
}
