//! # EasyPark
//!
//! Reservation lifecycle and parking-space accounting for the EasyPark
//! parking-reservation prototype.
//!
//! Four collections are managed, each persisted as one JSON array under one
//! storage key:
//!
//! - **Reservations**: booking codes and the `pending → confirmed → completed`
//!   lifecycle (with `cancelled` as the other exit)
//! - **Parking lots**: metadata, live available-space counters, search
//! - **Tariffs**: hourly and monthly prices
//! - **Accounts**: users, lot operators, their vehicles, login
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │                 ParkingApp                   │
//! │  booking / lots / tariffs / accounts / data  │
//! └──────────────────────────────────────────────┘
//!        │            │            │          │
//!  Reservation       Lot        Tariff     Account     (services)
//!        │            │            │          │
//!        └────────────┴─── Collection ────────┘        (load → reduce → save)
//!                             │
//!                       dyn Storage                    (file or in-memory)
//! ```
//!
//! Each command runs a reducer over a freshly loaded collection and writes
//! the collection back only when the reducer accepts it. Booking holds one
//! lot space before recording the reservation; cancelling a pending booking
//! or completing a stay gives the space back.
//!
//! # Usage
//!
//! ```ignore
//! let app = ParkingApp::open(Config::from_env())?;
//! let reservation = app
//!     .create_reservation(BookingRequest {
//!         account_id: AccountId::from("1"),
//!         lot_id: LotId::new(1),
//!         starts_at,
//!         duration_minutes: 120,
//!         plate: "abc123".to_string(),
//!     })
//!     .await?;
//! app.validate_reservation(reservation.code.as_str()).await?;
//! ```

#![forbid(unsafe_code)]

pub mod aggregates;
pub mod app;
pub mod config;
pub mod error;
pub mod geo;
pub mod repository;
pub mod seed;
pub mod sessions;
pub mod types;

pub use app::{BookingRequest, DataManager, Login, ParkingApp, Registration, Snapshot};
pub use config::Config;
pub use error::{CapacityError, ErrorKind, ParkingError, Result, TransitionError};
pub use types::{
    Account, AccountId, LotId, LotKind, Money, ParkingLot, Plate, Reservation, ReservationCode,
    ReservationId, ReservationStatus, Role, Tariff, TariffId, VehicleKind,
};
