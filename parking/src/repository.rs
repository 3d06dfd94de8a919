//! Collection repository.
//!
//! Each collection lives under one storage key as a JSON array, with a
//! sibling key holding its next-id counter as a decimal string. A
//! [`Collection`] owns those keys for one collection state type:
//!
//! 1. Load the records (falling back to the seed on any read problem)
//! 2. Run the caller's mutation against the in-memory state
//! 3. Write the whole array back, then the counter
//!
//! The per-collection mutex serializes read-modify-write inside one process.
//! Writes to different collections are independent and never atomic together.

use crate::error::{ParkingError, Result};
use crate::seed;
use crate::types::{
    Account, AccountState, LotState, ParkingLot, Reservation, ReservationState, Tariff,
    TariffState,
};
use easypark_core::storage::Storage;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Storage key names under one namespace prefix.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Keys {
    prefix: String,
}

impl Keys {
    /// Creates the key set for a prefix
    #[must_use]
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    fn key(&self, name: &str) -> String {
        format!("{}_{name}", self.prefix)
    }

    /// Namespace prefix
    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Whether a stored key belongs to this namespace
    #[must_use]
    pub fn owns(&self, key: &str) -> bool {
        key.strip_prefix(self.prefix.as_str())
            .is_some_and(|rest| rest.starts_with('_'))
    }

    /// Reservations array
    #[must_use]
    pub fn reservations(&self) -> String {
        self.key("reservations")
    }

    /// Public lot view
    #[must_use]
    pub fn lots(&self) -> String {
        self.key("lots")
    }

    /// Administrative lot view, kept identical to the public one
    #[must_use]
    pub fn lots_admin(&self) -> String {
        self.key("lots_admin")
    }

    /// Tariffs array
    #[must_use]
    pub fn tariffs(&self) -> String {
        self.key("tariffs")
    }

    /// Accounts array
    #[must_use]
    pub fn accounts(&self) -> String {
        self.key("accounts")
    }

    /// Counter key for a collection key
    #[must_use]
    pub fn counter(collection_key: &str) -> String {
        format!("{collection_key}_next_id")
    }
}

/// A collection state that can be split into records and a counter.
pub trait CollectionState: Send + 'static {
    /// Stored record type
    type Record: Serialize + DeserializeOwned + Clone + Send + Sync;

    /// Entity name used in logs
    const NAME: &'static str;

    /// Rebuilds the state, repairing a stale counter
    fn from_parts(records: Vec<Self::Record>, next_id: u64) -> Self;

    /// Records in storage order
    fn records(&self) -> &[Self::Record];

    /// Id handed to the next record
    fn next_id(&self) -> u64;

    /// Records served when storage has nothing usable
    fn seed() -> (Vec<Self::Record>, u64);
}

impl CollectionState for ReservationState {
    type Record = Reservation;
    const NAME: &'static str = "reservations";

    fn from_parts(records: Vec<Reservation>, next_id: u64) -> Self {
        Self::new(records, next_id)
    }

    fn records(&self) -> &[Reservation] {
        &self.reservations
    }

    fn next_id(&self) -> u64 {
        self.next_id
    }

    fn seed() -> (Vec<Reservation>, u64) {
        (seed::reservations(), seed::NEXT_RESERVATION_ID)
    }
}

impl CollectionState for LotState {
    type Record = ParkingLot;
    const NAME: &'static str = "lots";

    fn from_parts(records: Vec<ParkingLot>, next_id: u64) -> Self {
        Self::new(records, next_id)
    }

    fn records(&self) -> &[ParkingLot] {
        &self.lots
    }

    fn next_id(&self) -> u64 {
        self.next_id
    }

    fn seed() -> (Vec<ParkingLot>, u64) {
        (seed::lots(), seed::NEXT_LOT_ID)
    }
}

impl CollectionState for TariffState {
    type Record = Tariff;
    const NAME: &'static str = "tariffs";

    fn from_parts(records: Vec<Tariff>, next_id: u64) -> Self {
        Self::new(records, next_id)
    }

    fn records(&self) -> &[Tariff] {
        &self.tariffs
    }

    fn next_id(&self) -> u64 {
        self.next_id
    }

    fn seed() -> (Vec<Tariff>, u64) {
        (seed::tariffs(), seed::NEXT_TARIFF_ID)
    }
}

impl CollectionState for AccountState {
    type Record = Account;
    const NAME: &'static str = "accounts";

    fn from_parts(records: Vec<Account>, next_id: u64) -> Self {
        Self::new(records, next_id)
    }

    fn records(&self) -> &[Account] {
        &self.accounts
    }

    fn next_id(&self) -> u64 {
        self.next_id
    }

    fn seed() -> (Vec<Account>, u64) {
        (seed::accounts(), seed::NEXT_ACCOUNT_ID)
    }
}

/// One persisted collection.
pub struct Collection<S: CollectionState> {
    storage: Arc<dyn Storage>,
    key: String,
    mirrors: Vec<String>,
    counter_key: String,
    lock: Mutex<()>,
    _state: std::marker::PhantomData<fn() -> S>,
}

impl<S: CollectionState> Collection<S> {
    /// Creates a collection stored under `key`
    #[must_use]
    pub fn new(storage: Arc<dyn Storage>, key: String) -> Self {
        Self {
            storage,
            counter_key: Keys::counter(&key),
            key,
            mirrors: Vec::new(),
            lock: Mutex::new(()),
            _state: std::marker::PhantomData,
        }
    }

    /// Also writes every save to `key`, and reads it when the primary key is unusable
    #[must_use]
    pub fn mirrored_to(mut self, key: String) -> Self {
        self.mirrors.push(key);
        self
    }

    /// Primary storage key
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Every key this collection writes
    #[must_use]
    pub fn all_keys(&self) -> Vec<&str> {
        let mut keys = vec![self.key.as_str()];
        keys.extend(self.mirrors.iter().map(String::as_str));
        keys.push(self.counter_key.as_str());
        keys
    }

    fn read_records(&self, key: &str) -> Option<Vec<S::Record>> {
        match self.storage.load(key) {
            Ok(Some(bytes)) => match serde_json::from_slice(&bytes) {
                Ok(records) => Some(records),
                Err(error) => {
                    tracing::warn!(key, %error, "Stored {} are corrupt", S::NAME);
                    None
                }
            },
            Ok(None) => None,
            Err(error) => {
                tracing::warn!(key, %error, "Failed to read stored {}", S::NAME);
                None
            }
        }
    }

    fn read_counter(&self) -> Option<u64> {
        match self.storage.load(&self.counter_key) {
            Ok(Some(bytes)) => {
                let parsed = std::str::from_utf8(&bytes)
                    .ok()
                    .map(|text| text.trim().trim_matches('"'))
                    .and_then(|text| text.parse().ok());
                if parsed.is_none() {
                    tracing::warn!(key = %self.counter_key, "Stored counter is not a number");
                }
                parsed
            }
            Ok(None) => None,
            Err(error) => {
                tracing::warn!(key = %self.counter_key, %error, "Failed to read counter");
                None
            }
        }
    }

    /// Loads the collection, falling back to the seed when nothing usable is stored
    #[must_use]
    pub fn load(&self) -> S {
        let stored = std::iter::once(&self.key)
            .chain(&self.mirrors)
            .find_map(|key| self.read_records(key));

        let (seed_records, seed_next_id) = S::seed();
        let next_id = self.read_counter().unwrap_or(seed_next_id);
        match stored {
            Some(records) => S::from_parts(records, next_id),
            None => {
                tracing::debug!(collection = S::NAME, "Serving seed data");
                S::from_parts(seed_records, next_id)
            }
        }
    }

    fn write(&self, key: &str, bytes: &[u8]) -> Result<()> {
        self.storage.save(key, bytes).map_err(|error| {
            tracing::error!(key, %error, "Failed to write {}", S::NAME);
            ParkingError::from(error)
        })
    }

    fn write_records(&self, records: &[S::Record]) -> Result<()> {
        let bytes = serde_json::to_vec(records)?;
        self.write(&self.key, &bytes)?;
        for mirror in &self.mirrors {
            self.write(mirror, &bytes)?;
        }
        Ok(())
    }

    fn write_counter(&self, next_id: u64) -> Result<()> {
        self.write(&self.counter_key, next_id.to_string().as_bytes())
    }

    /// Writes the whole collection and its counter
    ///
    /// # Errors
    ///
    /// Returns [`ParkingError::Storage`] when the backend rejects a write.
    pub fn save(&self, state: &S) -> Result<()> {
        self.write_records(state.records())?;
        self.write_counter(state.next_id())
    }

    /// Read-modify-write under the collection lock
    ///
    /// Nothing is written when `f` fails.
    ///
    /// # Errors
    ///
    /// Returns the error of `f`, or [`ParkingError::Storage`] when saving fails.
    pub async fn mutate<T>(&self, f: impl FnOnce(&mut S) -> Result<T>) -> Result<T> {
        let _guard = self.lock.lock().await;
        let mut state = self.load();
        let out = f(&mut state)?;
        self.save(&state)?;
        Ok(out)
    }

    /// Runs a query against a fresh load
    pub async fn read<T>(&self, f: impl FnOnce(&S) -> T) -> T {
        let _guard = self.lock.lock().await;
        f(&self.load())
    }

    /// Overwrites records and/or the counter; absent parts are left as they are
    ///
    /// # Errors
    ///
    /// Returns [`ParkingError::Storage`] when the backend rejects a write.
    pub async fn replace(&self, records: Option<&[S::Record]>, next_id: Option<u64>) -> Result<()> {
        let _guard = self.lock.lock().await;
        if let Some(records) = records {
            self.write_records(records)?;
        }
        if let Some(next_id) = next_id {
            self.write_counter(next_id)?;
        }
        Ok(())
    }

    /// Removes every key of the collection
    ///
    /// # Errors
    ///
    /// Returns [`ParkingError::Storage`] when the backend rejects a removal.
    pub async fn clear(&self) -> Result<()> {
        let _guard = self.lock.lock().await;
        for key in self.all_keys() {
            self.storage.remove(key)?;
        }
        Ok(())
    }
}

impl<S: CollectionState> std::fmt::Debug for Collection<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collection")
            .field("key", &self.key)
            .field("mirrors", &self.mirrors)
            .finish_non_exhaustive()
    }
}
