const EARTH_RADIUS_KM: f64 = 6371.0;

/// Great-circle distance between two points given in degrees, in kilometers,
/// rounded to two decimal places.
pub fn haversine_km(lat1: f64, lng1: f64, lat2: f64, lng2: f64) -> f64 {
    let d_lat = (lat2 - lat1).to_radians();
    let d_lng = (lng2 - lng1).to_radians();

    let a = (d_lat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (d_lng / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    round_2(EARTH_RADIUS_KM * c)
}

fn round_2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

pub fn is_valid_latitude(lat: f64) -> bool {
    (-90.0..=90.0).contains(&lat)
}

pub fn is_valid_longitude(lng: f64) -> bool {
    (-180.0..=180.0).contains(&lng)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_haversine_manila_quezon_city() {
        let distance = haversine_km(14.5995, 120.9842, 14.6760, 121.0437);
        assert_eq!(distance, 10.65);
    }

    #[test]
    fn test_haversine_one_degree_on_equator() {
        assert_eq!(haversine_km(0.0, 0.0, 0.0, 1.0), 111.19);
    }

    #[test]
    fn test_haversine_same_point_is_zero() {
        assert_eq!(haversine_km(10.0, 20.0, 10.0, 20.0), 0.0);
    }

    #[test]
    fn test_haversine_is_symmetric() {
        let there = haversine_km(-6.2088, 106.8456, -6.9175, 107.6191);
        let back = haversine_km(-6.9175, 107.6191, -6.2088, 106.8456);
        assert_eq!(there, back);
        assert!(there > 100.0 && there < 150.0);
    }

    #[test]
    fn test_coordinate_bounds() {
        assert!(is_valid_latitude(90.0));
        assert!(is_valid_latitude(-90.0));
        assert!(!is_valid_latitude(90.01));
        assert!(is_valid_longitude(-180.0));
        assert!(!is_valid_longitude(180.5));
        assert!(!is_valid_latitude(f64::NAN));
    }
}
