//! Aggregate reducers for EasyPark.
//!
//! This module contains all aggregate implementations:
//! - Reservation: booking lifecycle and access codes
//! - Lot: lot metadata and live availability
//! - Tariff: price table
//! - Account: users, operators and their vehicles

pub mod account;
pub mod lot;
pub mod reservation;
pub mod tariff;

pub use account::{
    AccountAction, AccountEvent, AccountFilter, AccountReducer, NewVehicle, ProfilePatch,
};
pub use lot::{
    Adjustment, LotAction, LotDraft, LotEvent, LotMatch, LotPatch, LotQuery, LotReducer,
    LotStatistics, Occupancy,
};
pub use reservation::{ReservationAction, ReservationEvent, ReservationFilter, ReservationReducer};
pub use tariff::{TariffAction, TariffEvent, TariffReducer};
