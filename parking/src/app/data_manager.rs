//! Bulk export, import, reset and counts across every collection.

use crate::error::Result;
use crate::repository::{Collection, Keys};
use crate::types::{
    Account, AccountState, LotState, ParkingLot, Reservation, ReservationState, Tariff,
    TariffState,
};
use chrono::{DateTime, Utc};
use easypark_core::environment::Clock;
use easypark_core::storage::Storage;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Every collection plus every counter, as one JSON document.
///
/// All parts are optional so a hand-trimmed snapshot can restore only some
/// collections.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// When the snapshot was taken
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exported_at: Option<DateTime<Utc>>,
    /// Reservations
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reservations: Option<Vec<Reservation>>,
    /// Public lot view
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lots: Option<Vec<ParkingLot>>,
    /// Administrative lot view
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lots_admin: Option<Vec<ParkingLot>>,
    /// Tariffs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tariffs: Option<Vec<Tariff>>,
    /// Accounts
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accounts: Option<Vec<Account>>,
    /// Next-id counters
    #[serde(default)]
    pub counters: Counters,
}

/// Next-id counters of a [`Snapshot`]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counters {
    /// Next reservation id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reservations: Option<u64>,
    /// Next lot id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lots: Option<u64>,
    /// Next tariff id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tariffs: Option<u64>,
    /// Next account id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accounts: Option<u64>,
}

impl Snapshot {
    /// Pretty-printed JSON
    ///
    /// # Errors
    ///
    /// Returns [`crate::ParkingError::Serialization`] if encoding fails.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parses a snapshot
    ///
    /// # Errors
    ///
    /// Returns [`crate::ParkingError::Serialization`] for malformed documents.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Record counts per collection
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Stats {
    /// Reservations
    pub reservations: usize,
    /// Lots, active or not
    pub lots: usize,
    /// Tariffs
    pub tariffs: usize,
    /// Accounts, active or not
    pub accounts: usize,
}

/// Bulk operations over every collection
pub struct DataManager {
    storage: Arc<dyn Storage>,
    keys: Keys,
    reservations: Arc<Collection<ReservationState>>,
    lots: Arc<Collection<LotState>>,
    tariffs: Arc<Collection<TariffState>>,
    accounts: Arc<Collection<AccountState>>,
    clock: Arc<dyn Clock>,
}

impl DataManager {
    /// Create a data manager over the given collections
    #[must_use]
    pub fn new(
        storage: Arc<dyn Storage>,
        keys: Keys,
        reservations: Arc<Collection<ReservationState>>,
        lots: Arc<Collection<LotState>>,
        tariffs: Arc<Collection<TariffState>>,
        accounts: Arc<Collection<AccountState>>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            storage,
            keys,
            reservations,
            lots,
            tariffs,
            accounts,
            clock,
        }
    }

    /// Snapshot of what every collection currently serves
    pub async fn export(&self) -> Snapshot {
        let reservations = self.reservations.read(|s| s.clone()).await;
        let lots = self.lots.read(|s| s.clone()).await;
        let tariffs = self.tariffs.read(|s| s.clone()).await;
        let accounts = self.accounts.read(|s| s.clone()).await;

        tracing::info!(
            reservations = reservations.count(),
            lots = lots.count(),
            tariffs = tariffs.count(),
            accounts = accounts.count(),
            "Data exported"
        );

        Snapshot {
            exported_at: Some(self.clock.now()),
            counters: Counters {
                reservations: Some(reservations.next_id),
                lots: Some(lots.next_id),
                tariffs: Some(tariffs.next_id),
                accounts: Some(accounts.next_id),
            },
            reservations: Some(reservations.reservations),
            lots_admin: Some(lots.lots.clone()),
            lots: Some(lots.lots),
            tariffs: Some(tariffs.tariffs),
            accounts: Some(accounts.accounts),
        }
    }

    /// Writes the parts present in a snapshot; absent parts are untouched
    ///
    /// The public lot view wins over the administrative one when both are
    /// present; either one is written to both keys.
    ///
    /// # Errors
    ///
    /// Returns [`crate::ParkingError::Storage`] on the first failed write.
    /// Collections written before the failure stay written.
    pub async fn import(&self, snapshot: &Snapshot) -> Result<()> {
        let counters = snapshot.counters;
        self.reservations
            .replace(snapshot.reservations.as_deref(), counters.reservations)
            .await?;
        self.lots
            .replace(
                snapshot.lots.as_deref().or(snapshot.lots_admin.as_deref()),
                counters.lots,
            )
            .await?;
        self.tariffs
            .replace(snapshot.tariffs.as_deref(), counters.tariffs)
            .await?;
        self.accounts
            .replace(snapshot.accounts.as_deref(), counters.accounts)
            .await?;

        tracing::info!(exported_at = ?snapshot.exported_at, "Data imported");
        Ok(())
    }

    /// Removes every key in the namespace; later reads serve the seed
    ///
    /// # Errors
    ///
    /// Returns [`crate::ParkingError::Storage`] when a key cannot be removed.
    pub async fn clear(&self) -> Result<()> {
        self.reservations.clear().await?;
        self.lots.clear().await?;
        self.tariffs.clear().await?;
        self.accounts.clear().await?;

        let strays: Vec<String> = self
            .storage
            .keys()?
            .into_iter()
            .filter(|key| self.keys.owns(key))
            .collect();
        for key in &strays {
            self.storage.remove(key)?;
        }

        tracing::warn!(prefix = self.keys.prefix(), strays = strays.len(), "All data cleared");
        Ok(())
    }

    /// Record counts per collection
    pub async fn stats(&self) -> Stats {
        Stats {
            reservations: self.reservations.read(ReservationState::count).await,
            lots: self.lots.read(LotState::count).await,
            tariffs: self.tariffs.read(TariffState::count).await,
            accounts: self.accounts.read(AccountState::count).await,
        }
    }
}
