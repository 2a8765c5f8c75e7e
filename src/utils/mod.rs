use chrono::Utc;

use crate::geo::Point;

/// 地球半径（千米）
pub const EARTH_RADIUS_KM: f64 = 6372.8;

/// 使用 Haversine 公式计算两点间的大圆距离（千米）
pub fn haversine(a: Point, b: Point) -> f64 {
    let phi1 = a.latitude.to_radians();
    let phi2 = b.latitude.to_radians();
    let delta_phi = (b.latitude - a.latitude).to_radians();
    let delta_lambda = (b.longitude - a.longitude).to_radians();

    let h = (delta_phi / 2.0).sin().powi(2)
        + phi1.cos() * phi2.cos() * (delta_lambda / 2.0).sin().powi(2);
    // 浮点误差可能让 h 略超出 [0, 1]
    let c = 2.0 * h.clamp(0.0, 1.0).sqrt().asin();

    EARTH_RADIUS_KM * c
}

/// 当前时间戳（毫秒）
pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::FRAC_PI_2;

    #[test]
    fn test_same_point_is_zero() {
        for p in [
            Point::new(0.0, 0.0),
            Point::new(40.7128, -74.0060),
            Point::new(-90.0, 180.0),
        ] {
            assert_eq!(haversine(p, p), 0.0);
        }
    }

    #[test]
    fn test_quarter_great_circle() {
        let d = haversine(Point::new(0.0, 0.0), Point::new(0.0, 90.0));
        assert!((d - EARTH_RADIUS_KM * FRAC_PI_2).abs() < 1e-6, "got {d}");
        assert!((d - 10010.4).abs() < 0.1);
    }

    #[test]
    fn test_antipodal_points_stay_finite() {
        let d = haversine(Point::new(0.0, 0.0), Point::new(0.0, 180.0));
        assert!(d.is_finite());
        assert!((d - EARTH_RADIUS_KM * std::f64::consts::PI).abs() < 1e-6);

        let d = haversine(Point::new(90.0, 0.0), Point::new(-90.0, 0.0));
        assert!(d.is_finite());
    }

    #[test]
    fn test_symmetric() {
        let a = Point::new(51.5074, -0.1278);
        let b = Point::new(48.8566, 2.3522);
        assert_eq!(haversine(a, b), haversine(b, a));
        assert!((haversine(a, b) - 343.6).abs() < 1.0);
    }
}
