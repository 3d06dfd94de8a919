//! Great-circle distance between coordinates.

use crate::types::Coordinates;

/// Mean Earth radius in meters.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Haversine distance between two points, in meters.
#[must_use]
pub fn haversine_m(a: Coordinates, b: Coordinates) -> f64 {
    let phi1 = a.lat.to_radians();
    let phi2 = b.lat.to_radians();
    let d_phi = (b.lat - a.lat).to_radians();
    let d_lambda = (b.lng - a.lng).to_radians();

    let h = (d_phi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    // Rounding can push h just past 1 near antipodes.
    let h = h.clamp(0.0, 1.0);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());

    EARTH_RADIUS_M * c
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_point_is_zero() {
        let armenia = Coordinates::new(4.5339, -75.6811);
        assert!(haversine_m(armenia, armenia).abs() < f64::EPSILON);
    }

    #[test]
    fn one_degree_of_latitude() {
        let d = haversine_m(Coordinates::new(0.0, 0.0), Coordinates::new(1.0, 0.0));
        assert!((110_000.0..112_500.0).contains(&d), "got {d}");
    }

    #[test]
    fn antipodes_are_half_the_circumference() {
        let pairs = [
            (Coordinates::new(0.0, 0.0), Coordinates::new(0.0, 180.0)),
            (Coordinates::new(90.0, 0.0), Coordinates::new(-90.0, 0.0)),
            (Coordinates::new(4.5339, -75.6811), Coordinates::new(-4.5339, 104.3189)),
        ];
        for (a, b) in pairs {
            let d = haversine_m(a, b);
            assert!(!d.is_nan());
            assert!((d - EARTH_RADIUS_M * std::f64::consts::PI).abs() < 1.0, "got {d}");
        }
    }

    #[test]
    fn symmetric() {
        let a = Coordinates::new(4.5339, -75.6811);
        let b = Coordinates::new(4.5450, -75.6650);
        assert!((haversine_m(a, b) - haversine_m(b, a)).abs() < 1e-6);
    }
}
