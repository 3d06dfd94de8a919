//! Account aggregate.
//!
//! Registration, profile edits, vehicles and activation flags. Email
//! uniqueness is enforced among *active* accounts only, so an address can be
//! registered again once its previous holder has been deactivated.
//!
//! Login is a read-only check ([`AccountState::authenticate`]); sessions are
//! kept outside the persisted collection.

use crate::error::ParkingError;
use crate::types::{
    Account, AccountClass, AccountId, AccountState, Plate, Role, Vehicle, VehicleKind,
    is_valid_email, normalize_email,
};
use chrono::{DateTime, Utc};
use easypark_core::environment::Clock;
use easypark_core::reducer::Reducer;
use easypark_core::{SmallVec, smallvec};
use std::sync::Arc;

/// Profile fields a user may change
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ProfilePatch {
    /// New display name
    pub name: Option<String>,
    /// New login email
    pub email: Option<String>,
    /// New phone number
    pub phone: Option<String>,
    /// New password
    pub password: Option<String>,
}

/// A vehicle as submitted by the user
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewVehicle {
    /// Raw plate
    pub plate: String,
    /// Manufacturer
    pub make: String,
    /// Model name
    pub model: String,
    /// Colour
    pub color: String,
    /// Category
    pub kind: VehicleKind,
}

/// Commands accepted by the account directory
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AccountAction {
    /// Sign up
    Register {
        /// Display name
        name: String,
        /// Login email
        email: String,
        /// Password
        password: String,
        /// Role name, see [`Role::parse`]
        role: String,
        /// Optional phone number
        phone: Option<String>,
    },

    /// Edit profile fields
    UpdateProfile {
        /// Account to edit
        id: AccountId,
        /// Fields to change
        patch: ProfilePatch,
    },

    /// Register a vehicle
    AddVehicle {
        /// Owning account
        id: AccountId,
        /// Vehicle data
        vehicle: NewVehicle,
    },

    /// Forget a vehicle
    RemoveVehicle {
        /// Owning account
        id: AccountId,
        /// Raw plate
        plate: String,
    },

    /// Activate or deactivate
    SetActive {
        /// Account to toggle
        id: AccountId,
        /// Desired flag
        active: bool,
    },

    /// Mark the email as verified or not
    SetVerified {
        /// Account to toggle
        id: AccountId,
        /// Desired flag
        verified: bool,
    },
}

/// Facts recorded by the account directory
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AccountEvent {
    /// An account was created
    Registered {
        /// The new record
        account: Account,
    },

    /// Profile fields changed
    ProfileUpdated {
        /// Snapshot after the change
        account: Account,
    },

    /// A vehicle was added
    VehicleAdded {
        /// Owning account
        id: AccountId,
        /// The vehicle
        vehicle: Vehicle,
    },

    /// A vehicle was removed
    VehicleRemoved {
        /// Owning account
        id: AccountId,
        /// Its plate
        plate: Plate,
    },

    /// The account was deactivated
    Deactivated {
        /// Account id
        id: AccountId,
        /// When
        at: DateTime<Utc>,
    },

    /// The account was re-activated
    Activated {
        /// Account id
        id: AccountId,
        /// When
        at: DateTime<Utc>,
    },

    /// The verification flag changed
    VerificationChanged {
        /// Account id
        id: AccountId,
        /// New flag
        verified: bool,
    },
}

/// Environment dependencies for the account directory
#[derive(Clone)]
pub struct AccountEnvironment {
    /// Clock for timestamps
    pub clock: Arc<dyn Clock>,
}

impl AccountEnvironment {
    /// Creates a new `AccountEnvironment`
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }
}

/// Reducer for the account directory
#[derive(Clone, Debug, Default)]
pub struct AccountReducer;

impl AccountReducer {
    /// Shortest accepted password
    pub const MIN_PASSWORD_LEN: usize = 8;

    /// Creates a new `AccountReducer`
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn validate_name(name: &str) -> Result<String, ParkingError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ParkingError::Validation("name is required".to_string()));
        }
        Ok(name.to_string())
    }

    fn validate_email(email: &str) -> Result<String, ParkingError> {
        let email = normalize_email(email);
        if !is_valid_email(&email) {
            return Err(ParkingError::Validation(format!("invalid email: {email}")));
        }
        Ok(email)
    }

    fn validate_password(password: &str) -> Result<(), ParkingError> {
        let long_enough = password.chars().count() >= Self::MIN_PASSWORD_LEN;
        let has_letter = password.chars().any(char::is_alphabetic);
        let has_digit = password.chars().any(|c| c.is_ascii_digit());
        if long_enough && has_letter && has_digit {
            Ok(())
        } else {
            Err(ParkingError::Validation(format!(
                "password must have at least {} characters with letters and digits",
                Self::MIN_PASSWORD_LEN
            )))
        }
    }

    /// Email must not be held by another active account
    fn ensure_email_free(
        state: &AccountState,
        email: &str,
        except: Option<&AccountId>,
    ) -> Result<(), ParkingError> {
        match state.active_by_email(email) {
            Some(holder) if except.is_none_or(|id| holder.id != *id) => Err(
                ParkingError::Conflict(format!("email {email} is already registered")),
            ),
            _ => Ok(()),
        }
    }

    fn account<'a>(state: &'a AccountState, id: &AccountId) -> Result<&'a Account, ParkingError> {
        state.get(id).ok_or_else(|| ParkingError::not_found("Account", id))
    }

    fn patched(
        state: &AccountState,
        account: &Account,
        patch: ProfilePatch,
        now: DateTime<Utc>,
    ) -> Result<Account, ParkingError> {
        let mut next = account.clone();
        if let Some(name) = patch.name {
            next.name = Self::validate_name(&name)?;
        }
        if let Some(email) = patch.email {
            let email = Self::validate_email(&email)?;
            if account.active {
                Self::ensure_email_free(state, &email, Some(&account.id))?;
            }
            next.email = email;
        }
        if let Some(phone) = patch.phone {
            let phone = phone.trim();
            next.phone = (!phone.is_empty()).then(|| phone.to_string());
        }
        if let Some(password) = patch.password {
            Self::validate_password(&password)?;
            next.password = password;
        }
        next.updated_at = Some(now);
        Ok(next)
    }

    fn apply_event(state: &mut AccountState, event: &AccountEvent) {
        match event {
            AccountEvent::Registered { account } => {
                if let Ok(numeric) = account.id.as_str().parse::<u64>() {
                    state.next_id = state.next_id.max(numeric.saturating_add(1));
                }
                state.accounts.push(account.clone());
            }
            AccountEvent::ProfileUpdated { account } => {
                if let Some(existing) = state.get_mut(&account.id) {
                    *existing = account.clone();
                }
            }
            AccountEvent::VehicleAdded { id, vehicle } => {
                if let Some(account) = state.get_mut(id) {
                    account.vehicles.push(vehicle.clone());
                }
            }
            AccountEvent::VehicleRemoved { id, plate } => {
                if let Some(account) = state.get_mut(id) {
                    account.vehicles.retain(|v| &v.plate != plate);
                }
            }
            AccountEvent::Deactivated { id, at } => {
                if let Some(account) = state.get_mut(id) {
                    account.active = false;
                    account.deactivated_at = Some(*at);
                }
            }
            AccountEvent::Activated { id, at } => {
                if let Some(account) = state.get_mut(id) {
                    account.active = true;
                    account.deactivated_at = None;
                    account.updated_at = Some(*at);
                }
            }
            AccountEvent::VerificationChanged { id, verified } => {
                if let Some(account) = state.get_mut(id) {
                    account.verified = *verified;
                }
            }
        }
    }
}

impl Reducer for AccountReducer {
    type State = AccountState;
    type Action = AccountAction;
    type Event = AccountEvent;
    type Environment = AccountEnvironment;
    type Error = ParkingError;

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> Result<SmallVec<[AccountEvent; 4]>, ParkingError> {
        let event = match action {
            AccountAction::Register {
                name,
                email,
                password,
                role,
                phone,
            } => {
                let name = Self::validate_name(&name)?;
                let email = Self::validate_email(&email)?;
                Self::validate_password(&password)?;
                let role = Role::parse(&role)?;
                Self::ensure_email_free(state, &email, None)?;
                if state.next_id.checked_add(1).is_none() {
                    return Err(ParkingError::Conflict("account id space exhausted".to_string()));
                }

                AccountEvent::Registered {
                    account: Account {
                        id: AccountId::from(state.next_id),
                        name,
                        email,
                        password,
                        role,
                        phone: phone
                            .map(|p| p.trim().to_string())
                            .filter(|p| !p.is_empty()),
                        active: true,
                        verified: true,
                        vehicles: Vec::new(),
                        created_at: env.clock.now(),
                        updated_at: None,
                        deactivated_at: None,
                    },
                }
            }

            AccountAction::UpdateProfile { id, patch } => {
                let account = Self::account(state, &id)?;
                AccountEvent::ProfileUpdated {
                    account: Self::patched(state, account, patch, env.clock.now())?,
                }
            }

            AccountAction::AddVehicle { id, vehicle } => {
                let account = Self::account(state, &id)?;
                let plate = Plate::parse(&vehicle.plate)?;
                if account.vehicle(&plate).is_some() {
                    return Err(ParkingError::Conflict(format!(
                        "vehicle {plate} is already registered on this account"
                    )));
                }
                AccountEvent::VehicleAdded {
                    id,
                    vehicle: Vehicle {
                        plate,
                        make: vehicle.make.trim().to_string(),
                        model: vehicle.model.trim().to_string(),
                        color: vehicle.color.trim().to_string(),
                        kind: vehicle.kind,
                        registered_at: env.clock.now(),
                    },
                }
            }

            AccountAction::RemoveVehicle { id, plate } => {
                let account = Self::account(state, &id)?;
                let plate = Plate::parse(&plate)?;
                if account.vehicle(&plate).is_none() {
                    return Err(ParkingError::not_found("Vehicle", plate));
                }
                AccountEvent::VehicleRemoved { id, plate }
            }

            AccountAction::SetActive { id, active } => {
                let account = Self::account(state, &id)?;
                if account.active == active {
                    return Ok(SmallVec::new());
                }
                let at = env.clock.now();
                if active {
                    Self::ensure_email_free(state, &account.email, Some(&id))?;
                    AccountEvent::Activated { id, at }
                } else {
                    AccountEvent::Deactivated { id, at }
                }
            }

            AccountAction::SetVerified { id, verified } => {
                let account = Self::account(state, &id)?;
                if account.verified == verified {
                    return Ok(SmallVec::new());
                }
                AccountEvent::VerificationChanged { id, verified }
            }
        };

        Self::apply_event(state, &event);
        Ok(smallvec![event])
    }
}

// ============================================================================
// Queries
// ============================================================================

/// Administrative account listing. Every field set must match.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AccountFilter {
    /// Activation flag
    pub active: Option<bool>,
    /// Coarse classification
    pub class: Option<AccountClass>,
    /// Case-insensitive substring of name or email
    pub text: Option<String>,
}

impl AccountFilter {
    /// Whether an account passes the filter
    #[must_use]
    pub fn matches(&self, account: &Account) -> bool {
        let text_matches = self
            .text
            .as_deref()
            .map(|t| t.trim().to_lowercase())
            .filter(|t| !t.is_empty())
            .is_none_or(|needle| {
                account.name.to_lowercase().contains(&needle) || account.email.contains(&needle)
            });

        text_matches
            && self.active.is_none_or(|a| account.active == a)
            && self.class.is_none_or(|c| account.class() == c)
    }
}

impl AccountState {
    /// Checks credentials in order: email, password, verification, activation
    ///
    /// When an email is held by both an active and a deactivated account,
    /// the active one is checked.
    ///
    /// # Errors
    ///
    /// - [`ParkingError::InvalidCredentials`] for an unknown email or wrong password
    /// - [`ParkingError::AccountUnverified`] when the email is not verified
    /// - [`ParkingError::AccountInactive`] when the account was deactivated
    pub fn authenticate(&self, email: &str, password: &str) -> Result<&Account, ParkingError> {
        let email = normalize_email(email);
        let account = self
            .active_by_email(&email)
            .or_else(|| self.accounts.iter().find(|a| a.email == email))
            .ok_or(ParkingError::InvalidCredentials)?;

        if account.password != password {
            return Err(ParkingError::InvalidCredentials);
        }
        if !account.verified {
            return Err(ParkingError::AccountUnverified);
        }
        if !account.active {
            return Err(ParkingError::AccountInactive);
        }
        Ok(account)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use easypark_testing::{ReducerTest, test_clock};

    fn env() -> AccountEnvironment {
        AccountEnvironment::new(Arc::new(test_clock()))
    }

    fn register(email: &str) -> AccountAction {
        AccountAction::Register {
            name: "Demo".to_string(),
            email: email.to_string(),
            password: "Demo1234".to_string(),
            role: "standard_user".to_string(),
            phone: None,
        }
    }

    fn state_with(email: &str) -> AccountState {
        let mut state = AccountState::new(Vec::new(), 1);
        AccountReducer::new()
            .reduce(&mut state, register(email), &env())
            .unwrap();
        state
    }

    #[test]
    fn test_register_normalizes_email() {
        ReducerTest::new(AccountReducer::new())
            .with_env(env())
            .given_state(AccountState::new(Vec::new(), 3))
            .when_action(register("  Demo@X.com "))
            .then_state(|state| {
                let account = &state.accounts[0];
                assert_eq!(account.id.as_str(), "3");
                assert_eq!(account.email, "demo@x.com");
                assert!(account.active && account.verified);
                assert_eq!(account.class(), AccountClass::Standard);
                assert_eq!(state.next_id, 4);
            })
            .then_events(|events| assert!(matches!(events, [AccountEvent::Registered { .. }])))
            .run();
    }

    #[test]
    fn test_register_rejects_exhausted_id_space() {
        ReducerTest::new(AccountReducer::new())
            .with_env(env())
            .given_state(AccountState::new(Vec::new(), u64::MAX))
            .when_action(register("late@x.com"))
            .then_state(|state| assert_eq!(state.count(), 0))
            .then_error(|error| assert!(matches!(error, ParkingError::Conflict(_))))
            .run();
    }

    #[test]
    fn test_register_duplicate_active_email() {
        ReducerTest::new(AccountReducer::new())
            .with_env(env())
            .given_state(state_with("demo@x.com"))
            .when_action(register("DEMO@x.com"))
            .then_state(|state| assert_eq!(state.count(), 1))
            .then_error(|error| assert!(matches!(error, ParkingError::Conflict(_))))
            .run();
    }

    #[test]
    fn test_register_after_deactivation() {
        let mut state = state_with("demo@x.com");
        AccountReducer::new()
            .reduce(
                &mut state,
                AccountAction::SetActive {
                    id: AccountId::from("1"),
                    active: false,
                },
                &env(),
            )
            .unwrap();

        ReducerTest::new(AccountReducer::new())
            .with_env(env())
            .given_state(state)
            .when_action(register("demo@x.com"))
            .then_state(|state| {
                assert_eq!(state.count(), 2);
                assert_eq!(state.active_by_email("demo@x.com").unwrap().id.as_str(), "2");
            })
            .then_events(|events| assert_eq!(events.len(), 1))
            .run();
    }

    #[test]
    fn test_reactivation_conflicts_with_new_holder() {
        let reducer = AccountReducer::new();
        let mut state = state_with("demo@x.com");
        let first = AccountId::from("1");
        reducer
            .reduce(
                &mut state,
                AccountAction::SetActive {
                    id: first.clone(),
                    active: false,
                },
                &env(),
            )
            .unwrap();
        reducer.reduce(&mut state, register("demo@x.com"), &env()).unwrap();

        ReducerTest::new(AccountReducer::new())
            .with_env(env())
            .given_state(state)
            .when_action(AccountAction::SetActive {
                id: first,
                active: true,
            })
            .then_error(|error| assert!(matches!(error, ParkingError::Conflict(_))))
            .run();
    }

    #[test]
    fn test_register_rejects_bad_input() {
        for action in [
            AccountAction::Register {
                name: "Demo".into(),
                email: "demo@x.com".into(),
                password: "Demo1234".into(),
                role: "root".into(),
                phone: None,
            },
            AccountAction::Register {
                name: "Demo".into(),
                email: "not-an-email".into(),
                password: "Demo1234".into(),
                role: "standard_user".into(),
                phone: None,
            },
            AccountAction::Register {
                name: "Demo".into(),
                email: "demo@x.com".into(),
                password: "short".into(),
                role: "standard_user".into(),
                phone: None,
            },
            AccountAction::Register {
                name: "  ".into(),
                email: "demo@x.com".into(),
                password: "Demo1234".into(),
                role: "standard_user".into(),
                phone: None,
            },
        ] {
            ReducerTest::new(AccountReducer::new())
                .with_env(env())
                .given_state(AccountState::default())
                .when_action(action)
                .then_state(|state| assert_eq!(state.count(), 0))
                .then_error(|error| assert!(matches!(error, ParkingError::Validation(_))))
                .run();
        }
    }

    #[test]
    fn test_vehicle_plates_are_unique_per_account() {
        let reducer = AccountReducer::new();
        let mut state = state_with("demo@x.com");
        let vehicle = NewVehicle {
            plate: "abc123".into(),
            make: "Mazda".into(),
            model: "3".into(),
            color: "Rojo".into(),
            kind: VehicleKind::Car,
        };
        reducer
            .reduce(
                &mut state,
                AccountAction::AddVehicle {
                    id: AccountId::from("1"),
                    vehicle: vehicle.clone(),
                },
                &env(),
            )
            .unwrap();
        assert_eq!(state.accounts[0].vehicles[0].plate.as_str(), "ABC123");

        let duplicate = reducer.reduce(
            &mut state,
            AccountAction::AddVehicle {
                id: AccountId::from("1"),
                vehicle: NewVehicle {
                    plate: " ABC123".into(),
                    ..vehicle
                },
            },
            &env(),
        );
        assert!(matches!(duplicate, Err(ParkingError::Conflict(_))));

        reducer
            .reduce(
                &mut state,
                AccountAction::RemoveVehicle {
                    id: AccountId::from("1"),
                    plate: "abc123".into(),
                },
                &env(),
            )
            .unwrap();
        assert!(state.accounts[0].vehicles.is_empty());
    }

    #[test]
    fn test_update_profile_email_conflict() {
        let reducer = AccountReducer::new();
        let mut state = state_with("a@x.com");
        reducer.reduce(&mut state, register("b@x.com"), &env()).unwrap();

        let result = reducer.reduce(
            &mut state,
            AccountAction::UpdateProfile {
                id: AccountId::from("2"),
                patch: ProfilePatch {
                    email: Some("A@x.com".into()),
                    ..ProfilePatch::default()
                },
            },
            &env(),
        );
        assert!(matches!(result, Err(ParkingError::Conflict(_))));

        reducer
            .reduce(
                &mut state,
                AccountAction::UpdateProfile {
                    id: AccountId::from("2"),
                    patch: ProfilePatch {
                        name: Some("Bea".into()),
                        email: Some("b@x.com".into()),
                        ..ProfilePatch::default()
                    },
                },
                &env(),
            )
            .unwrap();
        assert_eq!(state.accounts[1].name, "Bea");
    }

    #[test]
    fn test_authenticate_order() {
        let mut state = state_with("demo@x.com");
        assert_eq!(
            state.authenticate("nobody@x.com", "Demo1234").unwrap_err(),
            ParkingError::InvalidCredentials
        );
        assert_eq!(
            state.authenticate("demo@x.com", "wrong").unwrap_err(),
            ParkingError::InvalidCredentials
        );
        assert!(state.authenticate(" DEMO@x.com", "Demo1234").is_ok());

        state.accounts[0].verified = false;
        state.accounts[0].active = false;
        assert_eq!(
            state.authenticate("demo@x.com", "Demo1234").unwrap_err(),
            ParkingError::AccountUnverified
        );

        state.accounts[0].verified = true;
        assert_eq!(
            state.authenticate("demo@x.com", "Demo1234").unwrap_err(),
            ParkingError::AccountInactive
        );
    }

    #[test]
    fn test_filter() {
        let mut state = state_with("ana@x.com");
        state.accounts[0].role = Role::LotAdministrator;
        let account = &state.accounts[0];

        assert!(AccountFilter::default().matches(account));
        assert!(
            AccountFilter {
                class: Some(AccountClass::Administrator),
                text: Some("ANA".into()),
                active: Some(true),
            }
            .matches(account)
        );
        assert!(
            !AccountFilter {
                class: Some(AccountClass::Standard),
                ..AccountFilter::default()
            }
            .matches(account)
        );
    }
}
