//! Application coordinator - the operation surface used by callers.
//!
//! `ParkingApp` owns one service per collection and runs the operations that
//! span collections: booking holds a lot space before recording the
//! reservation, and cancelling or completing gives the space back. Those
//! steps are separate store writes; a failed second write is compensated,
//! never rolled back atomically.

use super::data_manager::DataManager;
use super::services::{AccountService, LotService, ReservationService, TariffService};
use crate::aggregates::account::{AccountEnvironment, NewVehicle, ProfilePatch};
use crate::aggregates::lot::{LotDraft, LotEnvironment, LotMatch, LotPatch};
use crate::aggregates::reservation::ReservationEnvironment;
use crate::aggregates::tariff::TariffEnvironment;
use crate::aggregates::{
    AccountAction, AccountFilter, Adjustment, LotAction, LotEvent, LotQuery, LotStatistics,
    ReservationAction, ReservationEvent, ReservationFilter, ReservationReducer, TariffAction,
    TariffEvent,
};
use crate::config::Config;
use crate::error::{ParkingError, Result};
use crate::repository::{Collection, Keys};
use crate::sessions::{Session, SessionRegistry};
use crate::types::{
    Account, AccountId, LotId, LotKind, Money, ParkingLot, Reservation, ReservationId, Tariff,
    TariffId,
};
use chrono::NaiveDateTime;
use easypark_core::SmallVec;
use easypark_core::environment::{Clock, Entropy, SystemClock, ThreadEntropy};
use easypark_core::storage::{FileStorage, Storage};
use std::sync::Arc;

/// A booking request
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BookingRequest {
    /// Booking account
    pub account_id: AccountId,
    /// Target lot
    pub lot_id: LotId,
    /// Requested start
    pub starts_at: NaiveDateTime,
    /// Estimated stay in minutes
    pub duration_minutes: u32,
    /// Vehicle plate as typed
    pub plate: String,
}

/// A sign-up request
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Registration {
    /// Display name
    pub name: String,
    /// Login email
    pub email: String,
    /// Password
    pub password: String,
    /// Role name
    pub role: String,
    /// Optional phone number
    pub phone: Option<String>,
}

/// Result of a successful login
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Login {
    /// Issued session
    pub session: Session,
    /// Logged-in account
    pub account: Account,
}

/// Main EasyPark application.
///
/// Coordinates all components:
/// - Collection repository over one storage backend
/// - Aggregate services (reservations, lots, tariffs, accounts)
/// - Session registry
/// - Data manager for bulk operations
pub struct ParkingApp {
    /// Reservation ledger
    pub reservations: ReservationService,
    /// Parking-lot registry
    pub lots: LotService,
    /// Tariff table
    pub tariffs: TariffService,
    /// Account directory
    pub accounts: AccountService,
    sessions: SessionRegistry,
    data: DataManager,
    clock: Arc<dyn Clock>,
    entropy: Arc<dyn Entropy>,
    config: Config,
}

impl ParkingApp {
    /// Opens the application on the file storage named by the configuration
    ///
    /// # Errors
    ///
    /// Returns [`ParkingError::Storage`] if the data directory cannot be created.
    pub fn open(config: Config) -> Result<Self> {
        let storage = FileStorage::open(&config.storage.data_dir)?;
        tracing::info!(data_dir = %config.storage.data_dir.display(), "EasyPark opened");
        Ok(Self::with_environment(
            Arc::new(storage),
            Arc::new(SystemClock),
            Arc::new(ThreadEntropy),
            config,
        ))
    }

    /// Wires the application over explicit dependencies
    #[must_use]
    pub fn with_environment(
        storage: Arc<dyn Storage>,
        clock: Arc<dyn Clock>,
        entropy: Arc<dyn Entropy>,
        config: Config,
    ) -> Self {
        let keys = Keys::new(config.storage.key_prefix.clone());
        let latency = config.latency();

        let reservations = Arc::new(Collection::new(storage.clone(), keys.reservations()));
        let lots = Arc::new(
            Collection::new(storage.clone(), keys.lots()).mirrored_to(keys.lots_admin()),
        );
        let tariffs = Arc::new(Collection::new(storage.clone(), keys.tariffs()));
        let accounts = Arc::new(Collection::new(storage.clone(), keys.accounts()));

        let data = DataManager::new(
            storage,
            keys,
            reservations.clone(),
            lots.clone(),
            tariffs.clone(),
            accounts.clone(),
            clock.clone(),
        );

        Self {
            reservations: ReservationService::new(
                reservations,
                ReservationEnvironment::new(
                    clock.clone(),
                    entropy.clone(),
                    config.service.code_attempts,
                ),
                latency,
            ),
            lots: LotService::new(lots, LotEnvironment::new(clock.clone()), latency),
            tariffs: TariffService::new(tariffs, TariffEnvironment::new(clock.clone()), latency),
            accounts: AccountService::new(accounts, AccountEnvironment::new(clock.clone()), latency),
            sessions: SessionRegistry::new(config.session_ttl()),
            data,
            clock,
            entropy,
            config,
        }
    }

    /// Active configuration
    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// Bulk export/import/clear/stats
    #[must_use]
    pub const fn data(&self) -> &DataManager {
        &self.data
    }

    // ========================================================================
    // Reservations
    // ========================================================================

    /// Books a space: holds one lot space, then records a pending reservation
    ///
    /// # Errors
    ///
    /// - [`ParkingError::NotFound`] for an unknown or inactive account or lot
    /// - [`ParkingError::Capacity`] when the lot has no free space
    /// - [`ParkingError::Validation`] for a blank plate or zero duration
    pub async fn create_reservation(&self, request: BookingRequest) -> Result<Reservation> {
        let account_id = request.account_id;
        self.accounts
            .find(&account_id)
            .await
            .filter(|a| a.active)
            .ok_or_else(|| ParkingError::not_found("Account", &account_id))?;
        let lot = self.lots.get_active(request.lot_id).await?;
        ReservationReducer::validate_create(
            &account_id,
            request.duration_minutes,
            &request.plate,
        )?;

        self.lots
            .handle(LotAction::DecrementAvailable { id: lot.id })
            .await?;

        let created = self
            .reservations
            .handle(ReservationAction::Create {
                account_id,
                lot_id: lot.id,
                starts_at: request.starts_at,
                duration_minutes: request.duration_minutes,
                plate: request.plate,
            })
            .await;

        let events = match created {
            Ok(events) => events,
            Err(error) => {
                tracing::warn!(lot_id = %lot.id, %error, "Booking failed, releasing held space");
                if let Err(compensation) = self
                    .lots
                    .handle(LotAction::IncrementAvailable { id: lot.id })
                    .await
                {
                    tracing::error!(lot_id = %lot.id, error = %compensation, "Failed to release held space");
                }
                return Err(error);
            }
        };

        let reservation = events
            .into_iter()
            .find_map(|event| match event {
                ReservationEvent::Created { reservation } => Some(reservation),
                _ => None,
            })
            .ok_or_else(|| ParkingError::not_found("Reservation", "new reservation"))?;

        tracing::info!(
            reservation_id = %reservation.id,
            code = %reservation.code,
            lot_id = %reservation.lot_id,
            "Reservation created"
        );
        Ok(reservation)
    }

    /// Operator validation at the gate
    ///
    /// # Errors
    ///
    /// - [`ParkingError::NotFound`] for an unknown code
    /// - [`ParkingError::Transition`] when the reservation is not pending
    pub async fn validate_reservation(&self, code: &str) -> Result<Reservation> {
        let events = self
            .reservations
            .handle(ReservationAction::Validate {
                code: code.to_string(),
            })
            .await?;
        let id = Self::touched(&events)?;

        tracing::info!(reservation_id = %id, "Reservation validated");
        self.reservations.get(id).await
    }

    /// Withdraws a pending reservation and releases its space
    ///
    /// # Errors
    ///
    /// - [`ParkingError::NotFound`] for an unknown id
    /// - [`ParkingError::Transition`] once confirmed, completed or cancelled
    pub async fn cancel_reservation(&self, id: ReservationId) -> Result<Reservation> {
        let events = self
            .reservations
            .handle(ReservationAction::Cancel { id })
            .await?;
        self.release_spaces(&events).await?;

        tracing::info!(reservation_id = %id, "Reservation cancelled");
        self.reservations.get(id).await
    }

    /// Ends a confirmed stay and releases its space
    ///
    /// # Errors
    ///
    /// - [`ParkingError::NotFound`] for an unknown id
    /// - [`ParkingError::Transition`] unless the reservation is confirmed
    pub async fn complete_reservation(&self, id: ReservationId) -> Result<Reservation> {
        let events = self
            .reservations
            .handle(ReservationAction::Complete { id })
            .await?;
        self.release_spaces(&events).await?;

        tracing::info!(reservation_id = %id, "Reservation completed");
        self.reservations.get(id).await
    }

    fn touched(events: &[ReservationEvent]) -> Result<ReservationId> {
        events
            .iter()
            .find_map(|event| match event {
                ReservationEvent::Created { reservation } => Some(reservation.id),
                ReservationEvent::Confirmed { id, .. }
                | ReservationEvent::Cancelled { id, .. }
                | ReservationEvent::Completed { id, .. } => Some(*id),
            })
            .ok_or_else(|| ParkingError::not_found("Reservation", "recorded event"))
    }

    async fn release_spaces(&self, events: &SmallVec<[ReservationEvent; 4]>) -> Result<()> {
        for lot_id in events.iter().filter_map(ReservationEvent::released_lot) {
            self.lots
                .handle(LotAction::IncrementAvailable { id: lot_id })
                .await
                .inspect_err(|error| {
                    tracing::error!(lot_id = %lot_id, %error, "Failed to release space");
                })?;
        }
        Ok(())
    }

    /// Every reservation of an account
    pub async fn reservations_for(&self, account: &AccountId) -> Vec<Reservation> {
        self.reservations.list_by_account(account).await
    }

    /// Operator listing
    pub async fn list_reservations(&self, filter: &ReservationFilter) -> Vec<Reservation> {
        self.reservations.list(filter).await
    }

    /// Estimated price of a reservation at its lot's tariff
    ///
    /// `None` when the lot has no tariff or its tariff was deleted.
    ///
    /// # Errors
    ///
    /// Returns [`ParkingError::NotFound`] for an unknown reservation or lot.
    pub async fn estimate_cost(&self, id: ReservationId) -> Result<Option<Money>> {
        let reservation = self.reservations.get(id).await?;
        let lot = self.lots.get_any(reservation.lot_id).await?;
        let Some(tariff_id) = lot.tariff_id else {
            return Ok(None);
        };
        Ok(self
            .tariffs
            .find(tariff_id)
            .await
            .and_then(|tariff| reservation.estimated_cost(&tariff)))
    }

    // ========================================================================
    // Parking lots
    // ========================================================================

    async fn ensure_tariff(&self, id: Option<TariffId>) -> Result<()> {
        match id {
            Some(id) if self.tariffs.find(id).await.is_none() => {
                Err(ParkingError::not_found("Tariff", id))
            }
            _ => Ok(()),
        }
    }

    /// Registers a lot; its tariff must exist
    ///
    /// # Errors
    ///
    /// - [`ParkingError::Validation`] listing every missing or invalid field
    /// - [`ParkingError::NotFound`] for an unknown tariff
    pub async fn create_lot(&self, draft: LotDraft) -> Result<ParkingLot> {
        self.ensure_tariff(draft.tariff_id).await?;
        let events = self.lots.handle(LotAction::Create { draft }).await?;
        let lot = events
            .into_iter()
            .find_map(|event| match event {
                LotEvent::Created { lot } => Some(lot),
                _ => None,
            })
            .ok_or_else(|| ParkingError::not_found("Parking lot", "new lot"))?;

        tracing::info!(lot_id = %lot.id, owner = %lot.owner_id, "Parking lot created");
        Ok(lot)
    }

    /// Active lot by id
    ///
    /// # Errors
    ///
    /// Returns [`ParkingError::NotFound`] for unknown or deactivated lots.
    pub async fn lot(&self, id: LotId) -> Result<ParkingLot> {
        self.lots.get_active(id).await
    }

    /// Patches a lot
    ///
    /// # Errors
    ///
    /// - [`ParkingError::PermissionDenied`] when `caller` does not own the lot
    /// - [`ParkingError::NotFound`] for an unknown lot or tariff
    /// - [`ParkingError::Validation`] for invalid fields
    pub async fn update_lot(
        &self,
        id: LotId,
        patch: LotPatch,
        caller: Option<AccountId>,
    ) -> Result<ParkingLot> {
        self.ensure_tariff(patch.tariff_id).await?;
        self.lots
            .handle_and_get(id, LotAction::Update { id, patch, caller })
            .await
    }

    /// Soft-deletes a lot
    ///
    /// # Errors
    ///
    /// - [`ParkingError::PermissionDenied`] when `caller` does not own the lot
    /// - [`ParkingError::NotFound`] for an unknown lot
    pub async fn soft_delete_lot(&self, id: LotId, caller: Option<AccountId>) -> Result<ParkingLot> {
        let lot = self
            .lots
            .handle_and_get(id, LotAction::SoftDelete { id, caller })
            .await?;
        tracing::info!(lot_id = %id, "Parking lot deactivated");
        Ok(lot)
    }

    /// Re-activates a lot; refused while it has no existing tariff
    ///
    /// # Errors
    ///
    /// - [`ParkingError::NotFound`] for an unknown lot
    /// - [`ParkingError::Validation`] when the tariff is absent or deleted
    pub async fn activate_lot(&self, id: LotId) -> Result<ParkingLot> {
        let lot = self.lots.get_any(id).await?;
        let priced = match lot.tariff_id {
            Some(tariff_id) => self.tariffs.find(tariff_id).await.is_some(),
            None => false,
        };
        if !priced {
            return Err(ParkingError::Validation(format!(
                "parking lot {id} has no tariff and cannot be activated"
            )));
        }
        self.lots
            .handle_and_get(id, LotAction::SetActive { id, active: true })
            .await
    }

    /// Administrative deactivation
    ///
    /// # Errors
    ///
    /// Returns [`ParkingError::NotFound`] for an unknown lot.
    pub async fn deactivate_lot(&self, id: LotId) -> Result<ParkingLot> {
        self.lots
            .handle_and_get(id, LotAction::SetActive { id, active: false })
            .await
    }

    /// Holds one space
    ///
    /// # Errors
    ///
    /// Returns [`ParkingError::Capacity`] when no space is free.
    pub async fn decrement_available(&self, id: LotId) -> Result<ParkingLot> {
        self.lots
            .handle_and_get(id, LotAction::DecrementAvailable { id })
            .await
    }

    /// Releases one space; no-op on a full lot
    ///
    /// # Errors
    ///
    /// Returns [`ParkingError::NotFound`] for an unknown lot.
    pub async fn increment_available(&self, id: LotId) -> Result<ParkingLot> {
        self.lots
            .handle_and_get(id, LotAction::IncrementAvailable { id })
            .await
    }

    /// Manual adjustment by the lot's owner
    ///
    /// # Errors
    ///
    /// - [`ParkingError::PermissionDenied`] when `caller` does not own the lot
    /// - [`ParkingError::Capacity`] when decrementing an empty lot
    pub async fn adjust_availability(
        &self,
        id: LotId,
        direction: Adjustment,
        caller: AccountId,
    ) -> Result<ParkingLot> {
        self.lots
            .handle_and_get(
                id,
                LotAction::Adjust {
                    id,
                    direction,
                    caller,
                },
            )
            .await
    }

    /// Overwrites the free-space counter
    ///
    /// # Errors
    ///
    /// Returns [`ParkingError::Capacity`] when `available` exceeds the total.
    pub async fn set_available(&self, id: LotId, available: u32) -> Result<ParkingLot> {
        self.lots
            .handle_and_get(id, LotAction::SetAvailable { id, available })
            .await
    }

    /// Public search
    pub async fn search_lots(&self, query: &LotQuery) -> Vec<LotMatch> {
        self.lots.search(query).await
    }

    /// Occupancy figures
    ///
    /// # Errors
    ///
    /// Returns [`ParkingError::NotFound`] for an unknown lot.
    pub async fn lot_statistics(&self, id: LotId) -> Result<LotStatistics> {
        self.lots.statistics(id).await
    }

    /// Active lots of an owner
    pub async fn lots_by_owner(
        &self,
        owner: &AccountId,
        text: Option<&str>,
        kind: Option<LotKind>,
    ) -> Vec<ParkingLot> {
        self.lots.owned_by(owner, text, kind).await
    }

    /// Administrative listing
    pub async fn admin_lots(&self, active: Option<bool>, kind: Option<LotKind>) -> Vec<ParkingLot> {
        self.lots.admin_list(active, kind).await
    }

    // ========================================================================
    // Tariffs
    // ========================================================================

    /// Adds a tariff
    ///
    /// # Errors
    ///
    /// Returns [`ParkingError::Validation`] for non-positive prices.
    pub async fn create_tariff(&self, hourly: Money, monthly: Option<Money>) -> Result<Tariff> {
        let events = self
            .tariffs
            .handle(TariffAction::Create { hourly, monthly })
            .await?;
        events
            .into_iter()
            .find_map(|event| match event {
                TariffEvent::Created { tariff } => Some(tariff),
                _ => None,
            })
            .ok_or_else(|| ParkingError::not_found("Tariff", "new tariff"))
    }

    /// Changes prices; `monthly: Some(None)` clears the monthly price
    ///
    /// # Errors
    ///
    /// - [`ParkingError::NotFound`] for an unknown tariff
    /// - [`ParkingError::Validation`] for non-positive prices
    pub async fn update_tariff(
        &self,
        id: TariffId,
        hourly: Option<Money>,
        monthly: Option<Option<Money>>,
    ) -> Result<Tariff> {
        self.tariffs
            .handle(TariffAction::Update {
                id,
                hourly,
                monthly,
            })
            .await?;
        self.tariffs.get(id).await
    }

    /// Removes a tariff; lots that reference it keep the dangling id
    ///
    /// # Errors
    ///
    /// Returns [`ParkingError::NotFound`] for an unknown tariff.
    pub async fn delete_tariff(&self, id: TariffId) -> Result<()> {
        self.tariffs.handle(TariffAction::Delete { id }).await?;

        let dangling = self
            .lots
            .admin_list(None, None)
            .await
            .iter()
            .filter(|lot| lot.tariff_id == Some(id))
            .count();
        if dangling > 0 {
            tracing::warn!(tariff_id = %id, lots = dangling, "Deleted tariff is still referenced");
        }
        Ok(())
    }

    // ========================================================================
    // Accounts
    // ========================================================================

    /// Signs up
    ///
    /// # Errors
    ///
    /// - [`ParkingError::Conflict`] when an active account holds the email
    /// - [`ParkingError::Validation`] for invalid fields or an unknown role
    pub async fn register(&self, registration: Registration) -> Result<Account> {
        let account = self
            .accounts
            .handle(AccountAction::Register {
                name: registration.name,
                email: registration.email,
                password: registration.password,
                role: registration.role,
                phone: registration.phone,
            })
            .await?;

        tracing::info!(account_id = %account.id, role = ?account.role, "Account registered");
        Ok(account)
    }

    /// Checks credentials and opens a session
    ///
    /// # Errors
    ///
    /// [`ParkingError::InvalidCredentials`], [`ParkingError::AccountUnverified`]
    /// or [`ParkingError::AccountInactive`], checked in that order.
    /// [`ParkingError::Conflict`] when no unique token could be drawn.
    pub async fn login(&self, email: &str, password: &str) -> Result<Login> {
        let account = self
            .accounts
            .authenticate(email, password)
            .await
            .inspect_err(|error| tracing::info!(%error, "Login rejected"))?;
        let session = self
            .sessions
            .issue(account.id.clone(), self.clock.now(), self.entropy.as_ref())
            .await?;

        tracing::info!(account_id = %account.id, "Logged in");
        Ok(Login { session, account })
    }

    /// Ends a session; returns whether the token was known
    pub async fn logout(&self, token: &str) -> bool {
        self.sessions.revoke(token).await
    }

    /// Account behind a session token
    ///
    /// # Errors
    ///
    /// - [`ParkingError::Unauthenticated`] for unknown or expired tokens
    /// - [`ParkingError::AccountInactive`] when the account was deactivated
    pub async fn profile(&self, token: &str) -> Result<Account> {
        let id = self.sessions.resolve(token, self.clock.now()).await?;
        let Some(account) = self.accounts.find(&id).await else {
            self.sessions.revoke(token).await;
            return Err(ParkingError::Unauthenticated);
        };
        if !account.active {
            return Err(ParkingError::AccountInactive);
        }
        Ok(account)
    }

    /// Edits profile fields
    ///
    /// # Errors
    ///
    /// - [`ParkingError::NotFound`] for an unknown account
    /// - [`ParkingError::Conflict`] when the new email is held by another active account
    pub async fn update_profile(&self, id: AccountId, patch: ProfilePatch) -> Result<Account> {
        self.accounts
            .handle(AccountAction::UpdateProfile { id, patch })
            .await
    }

    /// Registers a vehicle
    ///
    /// # Errors
    ///
    /// Returns [`ParkingError::Conflict`] when the account already has the plate.
    pub async fn add_vehicle(&self, id: AccountId, vehicle: NewVehicle) -> Result<Account> {
        self.accounts
            .handle(AccountAction::AddVehicle { id, vehicle })
            .await
    }

    /// Forgets a vehicle
    ///
    /// # Errors
    ///
    /// Returns [`ParkingError::NotFound`] when the account has no such plate.
    pub async fn remove_vehicle(&self, id: AccountId, plate: &str) -> Result<Account> {
        self.accounts
            .handle(AccountAction::RemoveVehicle {
                id,
                plate: plate.to_string(),
            })
            .await
    }

    /// Administrative listing
    pub async fn list_accounts(&self, filter: &AccountFilter) -> Vec<Account> {
        self.accounts.list(filter).await
    }

    /// Re-activates an account
    ///
    /// # Errors
    ///
    /// - [`ParkingError::NotFound`] for an unknown account
    /// - [`ParkingError::Conflict`] when its email now belongs to another active account
    pub async fn activate_account(&self, id: AccountId) -> Result<Account> {
        self.accounts
            .handle(AccountAction::SetActive { id, active: true })
            .await
    }

    /// Deactivates an account and ends its sessions
    ///
    /// # Errors
    ///
    /// Returns [`ParkingError::NotFound`] for an unknown account.
    pub async fn deactivate_account(&self, id: AccountId) -> Result<Account> {
        let account = self
            .accounts
            .handle(AccountAction::SetActive {
                id: id.clone(),
                active: false,
            })
            .await?;
        let revoked = self.sessions.revoke_account(&id).await;

        tracing::info!(account_id = %id, sessions = revoked, "Account deactivated");
        Ok(account)
    }

    /// Sets the email verification flag
    ///
    /// # Errors
    ///
    /// Returns [`ParkingError::NotFound`] for an unknown account.
    pub async fn set_verified(&self, id: AccountId, verified: bool) -> Result<Account> {
        self.accounts
            .handle(AccountAction::SetVerified { id, verified })
            .await
    }
}
