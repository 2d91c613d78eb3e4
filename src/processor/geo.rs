use crate::models::Position;

const EARTH_RADIUS_KM: f64 = 6_371.0;

/// Great-circle (haversine) distance in kilometers.
pub fn distance_km(a: Position, b: Position) -> f64 {
    let lat1_rad = a.lat.to_radians();
    let lat2_rad = b.lat.to_radians();
    let delta_lat = (b.lat - a.lat).to_radians();
    let delta_lon = (b.lon - a.lon).to_radians();

    let h = (delta_lat / 2.0).sin().powi(2)
        + lat1_rad.cos() * lat2_rad.cos() * (delta_lon / 2.0).sin().powi(2);
    // rounding can push h marginally outside [0, 1]
    let c = 2.0 * h.clamp(0.0, 1.0).sqrt().asin();

    EARTH_RADIUS_KM * c
}

#[cfg(test)]
mod tests {
    use super::*;

    const VEHICLE: Position = Position::new(-26.1440, 28.0436);

    #[test]
    fn distance_is_symmetric_and_zero_on_self() {
        let other = Position::new(-33.9249, 18.4241);
        assert_eq!(distance_km(VEHICLE, VEHICLE), 0.0);
        assert!((distance_km(VEHICLE, other) - distance_km(other, VEHICLE)).abs() < 1e-9);
        assert!(distance_km(VEHICLE, other) > 1000.0);
    }

    #[test]
    fn nearby_customer_is_inside_one_kilometer() {
        let d = distance_km(VEHICLE, Position::new(-26.1441, 28.0437));
        assert!(d > 0.0 && d < 0.02, "got {d}");
    }

    #[test]
    fn antipodal_points_do_not_produce_nan() {
        let d = distance_km(Position::new(0.0, 0.0), Position::new(0.0, 180.0));
        assert!(d.is_finite());
        assert!((d - std::f64::consts::PI * EARTH_RADIUS_KM).abs() < 1e-6);
    }
}
