//! Default records.
//!
//! Served whenever a collection is missing or unreadable, so a fresh install
//! (or a corrupted store) always has something to show: six lots around
//! Armenia, their tariffs, a demo driver, a demo operator and one booking.

use crate::types::{
    Account, AccountId, Coordinates, LotId, LotKind, Money, ParkingLot, Plate, Reservation,
    ReservationCode, ReservationId, ReservationStatus, Role, SpaceId, Tariff, TariffId, Vehicle,
    VehicleKind, features,
};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

/// Next reservation id after the seed
pub const NEXT_RESERVATION_ID: u64 = 2;
/// Next lot id after the seed
pub const NEXT_LOT_ID: u64 = 7;
/// Next tariff id after the seed
pub const NEXT_TARIFF_ID: u64 = 7;
/// Next account id after the seed
pub const NEXT_ACCOUNT_ID: u64 = 3;

fn utc(date: (i32, u32, u32), time: (u32, u32)) -> DateTime<Utc> {
    local(date, time).and_utc()
}

fn local((year, month, day): (i32, u32, u32), (hour, minute): (u32, u32)) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(year, month, day)
        .and_then(|d| d.and_hms_opt(hour, minute, 0))
        .unwrap_or_default()
}

fn seeded_at() -> DateTime<Utc> {
    utc((2025, 1, 1), (0, 0))
}

/// The demo booking: a confirmed two-hour stay in lot 1
#[must_use]
pub fn reservations() -> Vec<Reservation> {
    vec![Reservation {
        id: ReservationId::new(1),
        code: ReservationCode::from_input("A1B2C3"),
        account_id: AccountId::from("1"),
        lot_id: LotId::new(1),
        starts_at: local((2025, 11, 27), (10, 0)),
        duration_minutes: 120,
        plate: Plate::known("ABC123"),
        assigned_space: Some(SpaceId::from_number(101)),
        status: ReservationStatus::Confirmed,
        created_at: utc((2025, 11, 26), (15, 0)),
        entered_at: Some(utc((2025, 11, 27), (10, 0))),
        exited_at: None,
        cancelled_at: None,
    }]
}

struct LotSeed {
    id: u32,
    name: &'static str,
    address: &'static str,
    at: (f64, f64),
    hours: (&'static str, &'static str),
    total: u32,
    available: u32,
    kind: LotKind,
    features: &'static [&'static str],
    motorcycle_only: bool,
    owner: &'static str,
}

const LOTS: [LotSeed; 6] = [
    LotSeed {
        id: 1,
        name: "Parqueadero Centro",
        address: "Cra 14 #15-25, Armenia",
        at: (4.5389, -75.6811),
        hours: ("06:00", "22:00"),
        total: 50,
        available: 15,
        kind: LotKind::Covered,
        features: &[features::SECURITY_24_7, features::ACCESSIBLE],
        motorcycle_only: false,
        owner: "1",
    },
    LotSeed {
        id: 2,
        name: "Estacionamiento La 14",
        address: "Calle 23 #14-10, Armenia",
        at: (4.5402, -75.6828),
        hours: ("07:00", "20:00"),
        total: 30,
        available: 3,
        kind: LotKind::Uncovered,
        features: &[features::SECURITY_24_7],
        motorcycle_only: false,
        owner: "2",
    },
    LotSeed {
        id: 3,
        name: "Garaje Premium",
        address: "Av. Bolívar #20-15, Armenia",
        at: (4.5356, -75.6795),
        hours: ("00:00", "23:59"),
        total: 80,
        available: 25,
        kind: LotKind::Garage,
        features: &[
            features::SECURITY_24_7,
            features::EV_CHARGING,
            features::ACCESSIBLE,
        ],
        motorcycle_only: false,
        owner: "1",
    },
    LotSeed {
        id: 4,
        name: "Parking Plaza Bolívar",
        address: "Cra 13 #14-50, Armenia",
        at: (4.5378, -75.6803),
        hours: ("08:00", "18:00"),
        total: 40,
        available: 0,
        kind: LotKind::Covered,
        features: &[features::ACCESSIBLE],
        motorcycle_only: false,
        owner: "3",
    },
    LotSeed {
        id: 5,
        name: "AutoParque Norte",
        address: "Calle 30 #15-20, Armenia",
        at: (4.5425, -75.6842),
        hours: ("06:00", "22:00"),
        total: 60,
        available: 8,
        kind: LotKind::Covered,
        features: &[features::SECURITY_24_7, features::EV_CHARGING],
        motorcycle_only: false,
        owner: "1",
    },
    LotSeed {
        id: 6,
        name: "Estacionamiento Motos",
        address: "Cra 19 #22-35, Armenia",
        at: (4.5367, -75.6820),
        hours: ("07:00", "19:00"),
        total: 100,
        available: 45,
        kind: LotKind::Uncovered,
        features: &[],
        motorcycle_only: true,
        owner: "2",
    },
];

/// Six lots in Armenia; lot 4 is full and lot 6 takes motorcycles only
#[must_use]
pub fn lots() -> Vec<ParkingLot> {
    LOTS.iter()
        .map(|seed| ParkingLot {
            id: LotId::new(seed.id),
            name: seed.name.to_string(),
            address: seed.address.to_string(),
            coordinates: Coordinates::new(seed.at.0, seed.at.1),
            opens_at: seed.hours.0.to_string(),
            closes_at: seed.hours.1.to_string(),
            total_spaces: seed.total,
            available_spaces: seed.available,
            tariff_id: Some(TariffId::new(seed.id)),
            kind: seed.kind,
            features: seed.features.iter().map(|f| (*f).to_string()).collect(),
            motorcycle_only: seed.motorcycle_only,
            active: true,
            owner_id: AccountId::from(seed.owner),
            image_url: Some(format!("/images/parqueadero{}.jpg", seed.id)),
            created_at: seeded_at(),
            updated_at: None,
            deactivated_at: None,
        })
        .collect()
}

/// One tariff per seeded lot
#[must_use]
pub fn tariffs() -> Vec<Tariff> {
    [
        (3_000, 90_000),
        (2_500, 75_000),
        (5_000, 150_000),
        (2_000, 60_000),
        (3_500, 105_000),
        (1_500, 45_000),
    ]
    .into_iter()
    .zip(1..)
    .map(|((hourly, monthly), id)| Tariff {
        id: TariffId::new(id),
        hourly: Money::new(hourly),
        monthly: Some(Money::new(monthly)),
        created_at: seeded_at(),
        updated_at: None,
    })
    .collect()
}

/// A demo driver (id 1) and a demo lot operator (id 2)
#[must_use]
pub fn accounts() -> Vec<Account> {
    vec![
        Account {
            id: AccountId::from("1"),
            name: "Usuario Demo".to_string(),
            email: "demo@easyparking.com".to_string(),
            password: "Demo123!".to_string(),
            role: Role::StandardUser,
            phone: Some("3001234567".to_string()),
            active: true,
            verified: true,
            vehicles: vec![Vehicle {
                plate: Plate::known("ABC123"),
                make: "Toyota".to_string(),
                model: "Corolla".to_string(),
                color: "Blanco".to_string(),
                kind: VehicleKind::Car,
                registered_at: seeded_at(),
            }],
            created_at: seeded_at(),
            updated_at: None,
            deactivated_at: None,
        },
        Account {
            id: AccountId::from("2"),
            name: "Admin Demo".to_string(),
            email: "admin@easyparking.com".to_string(),
            password: "Admin123!".to_string(),
            role: Role::LotAdministrator,
            phone: None,
            active: true,
            verified: true,
            vehicles: Vec::new(),
            created_at: seeded_at(),
            updated_at: None,
            deactivated_at: None,
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AccountState, LotState, ReservationState, TariffState};

    #[test]
    fn counters_follow_the_records() {
        assert_eq!(ReservationState::new(reservations(), NEXT_RESERVATION_ID).next_id, 2);
        assert_eq!(LotState::new(lots(), NEXT_LOT_ID).next_id, 7);
        assert_eq!(TariffState::new(tariffs(), NEXT_TARIFF_ID).next_id, 7);
        assert_eq!(AccountState::new(accounts(), NEXT_ACCOUNT_ID).next_id, 3);
    }

    #[test]
    fn seeded_lots_respect_capacity() {
        for lot in lots() {
            assert!(lot.available_spaces <= lot.total_spaces, "{}", lot.name);
        }
        assert_eq!(lots()[3].available_spaces, 0);
        assert!(lots()[5].motorcycle_only);
    }

    #[test]
    fn seeded_booking_is_confirmed() {
        let booking = &reservations()[0];
        assert_eq!(booking.code.as_str(), "A1B2C3");
        assert_eq!(booking.status, ReservationStatus::Confirmed);
        assert_eq!(booking.assigned_space.as_ref().map(SpaceId::as_str), Some("101"));
    }
}
