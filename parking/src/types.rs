//! Domain types for EasyPark.
//!
//! This module contains the identifiers, value objects, entities and
//! collection states shared by the aggregates. Every collection state is a
//! plain vector in storage order plus its next-id counter, which is exactly
//! what gets persisted.

use crate::error::{ParkingError, Result};
use chrono::{DateTime, NaiveDateTime, NaiveTime, Utc};
use easypark_core::environment::Entropy;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeSet;
use std::fmt;

// ============================================================================
// Identifiers
// ============================================================================

/// Identifier of an account.
///
/// Canonically a string. Older stored records carry numeric ids, so
/// deserialization accepts both and coerces numbers to their decimal form.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AccountId(String);

impl AccountId {
    /// Creates an `AccountId` from anything string-like (trimmed)
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        let trimmed = id.trim();
        if trimmed.len() == id.len() {
            Self(id)
        } else {
            Self(trimmed.to_string())
        }
    }

    /// Returns the canonical string form
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AccountId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for AccountId {
    fn from(id: String) -> Self {
        Self::new(id)
    }
}

impl From<u64> for AccountId {
    fn from(id: u64) -> Self {
        Self(id.to_string())
    }
}

impl Serialize for AccountId {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for AccountId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Text(String),
            Unsigned(u64),
            Signed(i64),
        }

        Ok(match Raw::deserialize(deserializer)? {
            Raw::Text(text) => Self::new(text),
            Raw::Unsigned(number) => Self::from(number),
            Raw::Signed(number) => Self(number.to_string()),
        })
    }
}

macro_rules! numeric_id {
    ($(#[$meta:meta])* $name:ident($inner:ty)) => {
        $(#[$meta])*
        #[derive(
            Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name($inner);

        impl $name {
            #[doc = concat!("Creates a `", stringify!($name), "` from its numeric value")]
            #[must_use]
            pub const fn new(id: $inner) -> Self {
                Self(id)
            }

            /// Returns the numeric value
            #[must_use]
            pub const fn value(self) -> $inner {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

numeric_id!(
    /// Identifier of a parking lot
    LotId(u32)
);
numeric_id!(
    /// Identifier of a tariff
    TariffId(u32)
);
numeric_id!(
    /// Identifier of a reservation
    ReservationId(u64)
);

// ============================================================================
// Value Objects
// ============================================================================

/// Six-character access code handed to the driver.
///
/// Always upper-case ASCII letters and digits.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReservationCode(String);

impl ReservationCode {
    /// Characters a code is drawn from
    pub const ALPHABET: &'static [u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

    /// Length of every generated code
    pub const LENGTH: usize = 6;

    /// Draws a fresh code from the given entropy source
    #[must_use]
    pub fn generate(entropy: &dyn Entropy) -> Self {
        let code = (0..Self::LENGTH)
            .map(|_| char::from(Self::ALPHABET[entropy.pick(Self::ALPHABET.len())]))
            .collect();
        Self(code)
    }

    /// Normalizes user input for lookup (trimmed, upper-cased)
    #[must_use]
    pub fn from_input(input: &str) -> Self {
        Self(input.trim().to_ascii_uppercase())
    }

    /// Checks the code has the generated shape
    #[must_use]
    pub fn is_well_formed(&self) -> bool {
        self.0.len() == Self::LENGTH
            && self
                .0
                .bytes()
                .all(|b| b.is_ascii_uppercase() || b.is_ascii_digit())
    }

    /// Returns the code as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ReservationCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Vehicle license plate, trimmed and upper-cased.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct Plate(String);

impl Plate {
    /// Normalization applied on every ingress path
    #[must_use]
    pub fn normalize(raw: &str) -> String {
        raw.trim().to_uppercase()
    }

    /// Parses a plate, rejecting blank input
    ///
    /// # Errors
    ///
    /// Returns [`ParkingError::Validation`] when the plate is empty after trimming.
    pub fn parse(raw: &str) -> Result<Self> {
        let normalized = Self::normalize(raw);
        if normalized.is_empty() {
            return Err(ParkingError::Validation("plate is required".to_string()));
        }
        Ok(Self(normalized))
    }

    /// Plate from a literal known to be non-blank
    pub(crate) fn known(raw: &str) -> Self {
        Self(Self::normalize(raw))
    }

    /// Returns the plate as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl<'de> Deserialize<'de> for Plate {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Self(Self::normalize(&raw)))
    }
}

impl fmt::Display for Plate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Physical space number assigned when a reservation is validated.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SpaceId(String);

impl SpaceId {
    /// Creates a space id from its number
    #[must_use]
    pub fn from_number(number: u64) -> Self {
        Self(number.to_string())
    }

    /// Returns the space id as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SpaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Amount in whole pesos (the currency has no minor unit in practice).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(u64);

impl Money {
    /// Creates a `Money` value from whole pesos
    #[must_use]
    pub const fn new(pesos: u64) -> Self {
        Self(pesos)
    }

    /// Returns the amount in pesos
    #[must_use]
    pub const fn pesos(self) -> u64 {
        self.0
    }

    /// Checks if the amount is zero
    #[must_use]
    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// Price of `minutes` at this hourly rate, rounded up to the next peso
    #[must_use]
    pub const fn prorate_minutes(self, minutes: u32) -> Option<Self> {
        match self.0.checked_mul(minutes as u64) {
            Some(product) => Some(Self(product.div_ceil(60))),
            None => None,
        }
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "${}", self.0)
    }
}

/// Latitude/longitude pair in degrees.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    /// Latitude in degrees, `-90..=90`
    pub lat: f64,
    /// Longitude in degrees, `-180..=180`
    pub lng: f64,
}

impl Coordinates {
    /// Creates a coordinate pair
    #[must_use]
    pub const fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Checks both components are finite and in range
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lng.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lng)
    }
}

/// Checks an `HH:MM` time-of-day string.
#[must_use]
pub fn is_time_of_day(value: &str) -> bool {
    value.len() == 5 && NaiveTime::parse_from_str(value, "%H:%M").is_ok()
}

// ============================================================================
// Enumerations
// ============================================================================

/// Construction type of a lot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LotKind {
    /// Roofed open structure
    Covered,
    /// Open-air lot
    Uncovered,
    /// Enclosed garage building
    Garage,
}

/// Vehicle category used for lot matching and registered vehicles.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VehicleKind {
    /// Passenger car
    Car,
    /// Motorcycle
    Motorcycle,
}

/// Role chosen at registration.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Driver booking spaces
    StandardUser,
    /// Operator managing one or more lots
    LotAdministrator,
}

impl Role {
    /// Parses a role name
    ///
    /// Accepts the snake-case names as well as the labels shown by the
    /// registration form.
    ///
    /// # Errors
    ///
    /// Returns [`ParkingError::Validation`] for anything outside the closed set.
    pub fn parse(raw: &str) -> Result<Self> {
        match raw.trim().to_lowercase().as_str() {
            "standard_user" | "standard user" | "usuario" => Ok(Self::StandardUser),
            "lot_administrator"
            | "lot administrator"
            | "administrador de parqueadero" => Ok(Self::LotAdministrator),
            other => Err(ParkingError::Validation(format!("invalid role: {other}"))),
        }
    }

    /// Coarse classification used by authorization checks
    #[must_use]
    pub const fn class(self) -> AccountClass {
        match self {
            Self::StandardUser => AccountClass::Standard,
            Self::LotAdministrator => AccountClass::Administrator,
        }
    }
}

/// Coarse account classification derived from [`Role`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountClass {
    /// Regular driver
    Standard,
    /// May manage lots and validate reservations
    Administrator,
}

/// Reservation lifecycle state.
///
/// `pending → confirmed → completed`, plus `pending → cancelled` and
/// `confirmed → cancelled`. `completed` and `cancelled` are terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReservationStatus {
    /// Booked, waiting for an operator to validate the code
    Pending,
    /// Validated at the gate, space assigned
    Confirmed,
    /// Vehicle left
    Completed,
    /// Booking withdrawn
    Cancelled,
}

impl ReservationStatus {
    /// Whether the state graph has an edge `self → next`
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Confirmed | Self::Cancelled)
                | (Self::Confirmed, Self::Completed | Self::Cancelled)
        )
    }

    /// Whether no transition leaves this state
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }
}

impl fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Pending => "pending",
            Self::Confirmed => "confirmed",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

// ============================================================================
// Entities
// ============================================================================

/// A booking of one space in one lot.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Reservation {
    /// Unique reservation identifier
    pub id: ReservationId,
    /// Access code presented at the gate
    pub code: ReservationCode,
    /// Booking account
    pub account_id: AccountId,
    /// Target lot
    pub lot_id: LotId,
    /// Requested start (local wall-clock time)
    pub starts_at: NaiveDateTime,
    /// Estimated stay in minutes
    pub duration_minutes: u32,
    /// Vehicle plate
    pub plate: Plate,
    /// Space assigned on validation
    pub assigned_space: Option<SpaceId>,
    /// Lifecycle state
    pub status: ReservationStatus,
    /// When the booking was recorded
    pub created_at: DateTime<Utc>,
    /// When the vehicle was checked in
    pub entered_at: Option<DateTime<Utc>>,
    /// When the vehicle left
    pub exited_at: Option<DateTime<Utc>>,
    /// When the booking was withdrawn
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cancelled_at: Option<DateTime<Utc>>,
}

impl Reservation {
    /// Estimated price of the stay at the given tariff
    #[must_use]
    pub fn estimated_cost(&self, tariff: &Tariff) -> Option<Money> {
        tariff.hourly.prorate_minutes(self.duration_minutes)
    }
}

/// Well-known lot features.
pub mod features {
    /// Round-the-clock security staff
    pub const SECURITY_24_7: &str = "24/7 security";
    /// Electric vehicle charging points
    pub const EV_CHARGING: &str = "EV charging";
    /// Step-free access
    pub const ACCESSIBLE: &str = "accessible access";
}

/// A parking facility.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ParkingLot {
    /// Unique lot identifier
    pub id: LotId,
    /// Display name
    pub name: String,
    /// Street address
    pub address: String,
    /// Location
    pub coordinates: Coordinates,
    /// Opening time, `HH:MM`
    pub opens_at: String,
    /// Closing time, `HH:MM`
    pub closes_at: String,
    /// Number of spaces
    pub total_spaces: u32,
    /// Spaces currently free, never above `total_spaces`
    pub available_spaces: u32,
    /// Price list, may dangle after a tariff is deleted
    pub tariff_id: Option<TariffId>,
    /// Construction type
    pub kind: LotKind,
    /// Feature labels, see [`features`]
    #[serde(default)]
    pub features: BTreeSet<String>,
    /// Only motorcycles may park
    #[serde(default)]
    pub motorcycle_only: bool,
    /// Soft-delete flag
    pub active: bool,
    /// Owning account
    pub owner_id: AccountId,
    /// Optional picture
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last update
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    /// Soft-delete time
    #[serde(default)]
    pub deactivated_at: Option<DateTime<Utc>>,
}

impl ParkingLot {
    /// Checks a feature label is present
    #[must_use]
    pub fn has_feature(&self, feature: &str) -> bool {
        self.features.contains(feature)
    }

    /// Number of spaces in use
    #[must_use]
    pub const fn occupied_spaces(&self) -> u32 {
        self.total_spaces.saturating_sub(self.available_spaces)
    }

    /// Whether a vehicle of this kind may park here
    #[must_use]
    pub const fn accepts(&self, vehicle: VehicleKind) -> bool {
        match vehicle {
            VehicleKind::Motorcycle => self.motorcycle_only,
            VehicleKind::Car => !self.motorcycle_only,
        }
    }
}

/// Price list referenced by lots.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tariff {
    /// Unique tariff identifier
    pub id: TariffId,
    /// Price per hour
    pub hourly: Money,
    /// Optional monthly subscription price
    pub monthly: Option<Money>,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last update
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

/// A registered vehicle.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vehicle {
    /// Plate, unique per account
    pub plate: Plate,
    /// Manufacturer
    pub make: String,
    /// Model name
    pub model: String,
    /// Colour
    pub color: String,
    /// Category
    pub kind: VehicleKind,
    /// When it was added
    pub registered_at: DateTime<Utc>,
}

/// A user or operator account.
///
/// Passwords are stored in plain text; this is a prototype credential store,
/// not a security boundary.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// Canonical account id
    pub id: AccountId,
    /// Display name
    pub name: String,
    /// Login email, trimmed and lower-cased
    pub email: String,
    /// Plain-text password
    pub password: String,
    /// Role chosen at registration
    pub role: Role,
    /// Optional phone number
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    /// Soft-delete flag
    pub active: bool,
    /// Email verification flag
    pub verified: bool,
    /// Registered vehicles
    #[serde(default)]
    pub vehicles: Vec<Vehicle>,
    /// Registration time
    pub created_at: DateTime<Utc>,
    /// Last profile update
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    /// Deactivation time
    #[serde(default)]
    pub deactivated_at: Option<DateTime<Utc>>,
}

impl Account {
    /// Coarse classification derived from the role
    #[must_use]
    pub const fn class(&self) -> AccountClass {
        self.role.class()
    }

    /// Finds a registered vehicle by (normalized) plate
    #[must_use]
    pub fn vehicle(&self, plate: &Plate) -> Option<&Vehicle> {
        self.vehicles.iter().find(|v| &v.plate == plate)
    }
}

/// Normalization applied to every email on ingress.
#[must_use]
pub fn normalize_email(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// Minimal email shape check: `local@domain.tld`.
#[must_use]
pub fn is_valid_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && !email.chars().any(char::is_whitespace)
        && domain
            .split_once('.')
            .is_some_and(|(host, tld)| !host.is_empty() && !tld.is_empty() && !tld.ends_with('.'))
}

// ============================================================================
// Collection States
// ============================================================================

/// Every reservation, in storage order, plus the id counter.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ReservationState {
    /// All reservations
    pub reservations: Vec<Reservation>,
    /// Id handed to the next reservation
    pub next_id: u64,
}

impl ReservationState {
    /// Creates a state from stored records, repairing a stale counter
    #[must_use]
    pub fn new(reservations: Vec<Reservation>, next_id: u64) -> Self {
        let highest = reservations.iter().map(|r| r.id.value()).max().unwrap_or(0);
        Self {
            reservations,
            next_id: next_id.max(highest.saturating_add(1)),
        }
    }

    /// Gets a reservation by id
    #[must_use]
    pub fn get(&self, id: ReservationId) -> Option<&Reservation> {
        self.reservations.iter().find(|r| r.id == id)
    }

    /// Gets a reservation by id for mutation
    pub fn get_mut(&mut self, id: ReservationId) -> Option<&mut Reservation> {
        self.reservations.iter_mut().find(|r| r.id == id)
    }

    /// Finds a reservation by code (case-insensitive)
    #[must_use]
    pub fn find_by_code(&self, code: &str) -> Option<&Reservation> {
        let code = ReservationCode::from_input(code);
        self.reservations.iter().find(|r| r.code == code)
    }

    /// Whether any stored reservation already uses `code`
    #[must_use]
    pub fn code_in_use(&self, code: &ReservationCode) -> bool {
        self.reservations.iter().any(|r| &r.code == code)
    }

    /// Every reservation of an account, in storage order
    ///
    /// Ids compare by their string form, so records stored with a numeric
    /// account id still match.
    #[must_use]
    pub fn by_account(&self, account: &AccountId) -> Vec<&Reservation> {
        self.reservations
            .iter()
            .filter(|r| r.account_id.as_str() == account.as_str())
            .collect()
    }

    /// Number of reservations
    #[must_use]
    pub fn count(&self) -> usize {
        self.reservations.len()
    }
}

/// Every lot, in storage order, plus the id counter.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LotState {
    /// All lots, active or not
    pub lots: Vec<ParkingLot>,
    /// Id handed to the next lot
    pub next_id: u64,
}

impl LotState {
    /// Creates a state from stored records, repairing a stale counter
    #[must_use]
    pub fn new(lots: Vec<ParkingLot>, next_id: u64) -> Self {
        let highest = lots.iter().map(|l| u64::from(l.id.value())).max().unwrap_or(0);
        Self {
            lots,
            next_id: next_id.max(highest.saturating_add(1)),
        }
    }

    /// Gets a lot by id, active or not
    #[must_use]
    pub fn get(&self, id: LotId) -> Option<&ParkingLot> {
        self.lots.iter().find(|l| l.id == id)
    }

    /// Gets a lot by id for mutation
    pub fn get_mut(&mut self, id: LotId) -> Option<&mut ParkingLot> {
        self.lots.iter_mut().find(|l| l.id == id)
    }

    /// Gets an active lot by id
    #[must_use]
    pub fn get_active(&self, id: LotId) -> Option<&ParkingLot> {
        self.get(id).filter(|l| l.active)
    }

    /// Number of lots
    #[must_use]
    pub fn count(&self) -> usize {
        self.lots.len()
    }
}

/// Every tariff plus the id counter.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TariffState {
    /// All tariffs
    pub tariffs: Vec<Tariff>,
    /// Id handed to the next tariff
    pub next_id: u64,
}

impl TariffState {
    /// Creates a state from stored records, repairing a stale counter
    #[must_use]
    pub fn new(tariffs: Vec<Tariff>, next_id: u64) -> Self {
        let highest = tariffs.iter().map(|t| u64::from(t.id.value())).max().unwrap_or(0);
        Self {
            tariffs,
            next_id: next_id.max(highest.saturating_add(1)),
        }
    }

    /// Gets a tariff by id
    #[must_use]
    pub fn get(&self, id: TariffId) -> Option<&Tariff> {
        self.tariffs.iter().find(|t| t.id == id)
    }

    /// Number of tariffs
    #[must_use]
    pub fn count(&self) -> usize {
        self.tariffs.len()
    }
}

/// Every account plus the id counter.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AccountState {
    /// All accounts, active or not
    pub accounts: Vec<Account>,
    /// Id handed to the next account
    pub next_id: u64,
}

impl AccountState {
    /// Creates a state from stored records, repairing a stale counter
    #[must_use]
    pub fn new(accounts: Vec<Account>, next_id: u64) -> Self {
        let highest = accounts
            .iter()
            .filter_map(|a| a.id.as_str().parse::<u64>().ok())
            .max()
            .unwrap_or(0);
        Self {
            accounts,
            next_id: next_id.max(highest.saturating_add(1)),
        }
    }

    /// Gets an account by id, active or not
    #[must_use]
    pub fn get(&self, id: &AccountId) -> Option<&Account> {
        self.accounts.iter().find(|a| a.id.as_str() == id.as_str())
    }

    /// Gets an account by id for mutation
    pub fn get_mut(&mut self, id: &AccountId) -> Option<&mut Account> {
        self.accounts
            .iter_mut()
            .find(|a| a.id.as_str() == id.as_str())
    }

    /// Finds the active account holding `email`
    #[must_use]
    pub fn active_by_email(&self, email: &str) -> Option<&Account> {
        let email = normalize_email(email);
        self.accounts.iter().find(|a| a.active && a.email == email)
    }

    /// Number of accounts
    #[must_use]
    pub fn count(&self) -> usize {
        self.accounts.len()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use easypark_testing::ScriptedEntropy;

    #[test]
    fn counters_saturate_on_the_largest_stored_id() {
        let mut reservations = crate::seed::reservations();
        reservations[0].id = ReservationId::new(u64::MAX);
        assert_eq!(ReservationState::new(reservations, 2).next_id, u64::MAX);

        let mut accounts = crate::seed::accounts();
        accounts[0].id = AccountId::from(u64::MAX);
        assert_eq!(AccountState::new(accounts, 3).next_id, u64::MAX);
    }

    #[test]
    fn account_id_accepts_numeric_json() {
        let from_number: AccountId = serde_json::from_str("7").unwrap();
        let from_text: AccountId = serde_json::from_str("\"7\"").unwrap();
        assert_eq!(from_number, from_text);
        assert_eq!(serde_json::to_string(&from_number).unwrap(), "\"7\"");
        assert_eq!(AccountId::from(7_u64), from_text);
    }

    #[test]
    fn generated_codes_use_the_alphabet() {
        let entropy = ScriptedEntropy::new(vec![0, 25, 26, 35, 36, 61]);
        let code = ReservationCode::generate(&entropy);
        assert_eq!(code.as_str(), "AZ09AZ");
        assert!(code.is_well_formed());
    }

    #[test]
    fn code_lookup_input_is_normalized() {
        assert_eq!(ReservationCode::from_input(" a1b2c3 ").as_str(), "A1B2C3");
        assert!(!ReservationCode::from_input("A1B2").is_well_formed());
    }

    #[test]
    fn plate_normalization() {
        assert_eq!(Plate::parse("  abc123 ").unwrap().as_str(), "ABC123");
        assert!(Plate::parse("   ").is_err());
        let stored: Plate = serde_json::from_str("\"xyz 9\"").unwrap();
        assert_eq!(stored.as_str(), "XYZ 9");
    }

    #[test]
    fn cost_rounds_up_to_the_next_peso() {
        assert_eq!(Money::new(3000).prorate_minutes(120), Some(Money::new(6000)));
        assert_eq!(Money::new(2500).prorate_minutes(45), Some(Money::new(1875)));
        assert_eq!(Money::new(1000).prorate_minutes(1), Some(Money::new(17)));
    }

    #[test]
    fn roles_map_to_classes() {
        assert_eq!(Role::parse("Usuario").unwrap().class(), AccountClass::Standard);
        assert_eq!(
            Role::parse("Administrador de Parqueadero").unwrap().class(),
            AccountClass::Administrator
        );
        assert_eq!(Role::parse("lot_administrator").unwrap(), Role::LotAdministrator);
        assert!(matches!(Role::parse("superuser"), Err(ParkingError::Validation(_))));
    }

    #[test]
    fn status_graph() {
        use ReservationStatus::{Cancelled, Completed, Confirmed, Pending};
        assert!(Pending.can_transition_to(Confirmed));
        assert!(Pending.can_transition_to(Cancelled));
        assert!(Confirmed.can_transition_to(Completed));
        assert!(!Pending.can_transition_to(Completed));
        for terminal in [Completed, Cancelled] {
            assert!(terminal.is_terminal());
            for next in [Pending, Confirmed, Completed, Cancelled] {
                assert!(!terminal.can_transition_to(next));
            }
        }
    }

    #[test]
    fn email_checks() {
        assert_eq!(normalize_email("  Demo@X.com "), "demo@x.com");
        assert!(is_valid_email("demo@x.com"));
        assert!(!is_valid_email("demo@x"));
        assert!(!is_valid_email("@x.com"));
        assert!(!is_valid_email("de mo@x.com"));
    }

    #[test]
    fn time_of_day() {
        assert!(is_time_of_day("06:00"));
        assert!(is_time_of_day("23:59"));
        assert!(!is_time_of_day("24:00"));
        assert!(!is_time_of_day("6:00"));
    }

    #[test]
    fn state_repairs_stale_counter() {
        let state = TariffState::new(
            vec![Tariff {
                id: TariffId::new(9),
                hourly: Money::new(1),
                monthly: None,
                created_at: Utc::now(),
                updated_at: None,
            }],
            2,
        );
        assert_eq!(state.next_id, 10);
    }
}
