//! Application layer - wires the collections, services and sessions together.
//!
//! This module provides:
//! - Aggregate services (load, reduce, save per collection)
//! - The `ParkingApp` coordinator for cross-collection operations
//! - The data manager for export, import and reset

mod coordinator;
mod data_manager;
mod services;

pub use coordinator::{BookingRequest, Login, ParkingApp, Registration};
pub use data_manager::{Counters, DataManager, Snapshot, Stats};
pub use services::{AccountService, LotService, ReservationService, TariffService};
