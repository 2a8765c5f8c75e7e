/// 地理编码模块
/// 定义坐标、格子和编码器接口

pub mod geohash;

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use geohash::IntGeohash;

/// 经纬度坐标
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub latitude: f64,
    pub longitude: f64,
}

impl Point {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }
}

/// 矩形范围，左上角和右下角
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub top_left: Point,
    pub bottom_right: Point,
}

impl BoundingBox {
    pub fn north(&self) -> f64 {
        self.top_left.latitude
    }

    pub fn south(&self) -> f64 {
        self.bottom_right.latitude
    }

    pub fn west(&self) -> f64 {
        self.top_left.longitude
    }

    pub fn east(&self) -> f64 {
        self.bottom_right.longitude
    }

    /// 边界上的点也算在内。跨越反子午线的框 west 大于 east。
    pub fn contains(&self, point: Point) -> bool {
        let lon = point.longitude;
        let lon_inside = if self.west() <= self.east() {
            lon >= self.west() && lon <= self.east()
        } else {
            lon >= self.west() || lon <= self.east()
        };
        point.latitude <= self.north() && point.latitude >= self.south() && lon_inside
    }
}

/// 格子编号
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CellId(pub u64);

impl CellId {
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for CellId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for CellId {
    fn from(value: u64) -> Self {
        CellId(value)
    }
}

/// 相邻格子的方向
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    West,
    East,
    North,
    South,
    NorthWest,
    NorthEast,
    SouthWest,
    SouthEast,
}

impl Direction {
    /// (纬度行偏移, 经度列偏移)，北为正、东为正
    pub fn offset(self) -> (i64, i64) {
        match self {
            Direction::West => (0, -1),
            Direction::East => (0, 1),
            Direction::North => (1, 0),
            Direction::South => (-1, 0),
            Direction::NorthWest => (1, -1),
            Direction::NorthEast => (1, 1),
            Direction::SouthWest => (-1, -1),
            Direction::SouthEast => (-1, 1),
        }
    }
}

/// `GeoCodec::neighbors` 的返回顺序。
///
/// 查询层按下标取角：在 `[cell] ++ neighbors` 中，下标 5 是西北，下标 8 是东南。
pub const NEIGHBOR_ORDER: [Direction; 8] = [
    Direction::West,
    Direction::East,
    Direction::North,
    Direction::South,
    Direction::NorthWest,
    Direction::NorthEast,
    Direction::SouthWest,
    Direction::SouthEast,
];

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CodecError {
    #[error("latitude out of range: {0}")]
    InvalidLatitude(f64),
    #[error("longitude out of range: {0}")]
    InvalidLongitude(f64),
    #[error("unsupported precision: {0}")]
    InvalidPrecision(u8),
    #[error("not a valid cell id: {0}")]
    InvalidCell(u64),
}

/// 地理编码器
///
/// 所有方法都是纯函数，不做 I/O。
pub trait GeoCodec: Send + Sync {
    fn encode(&self, point: Point, precision: u8) -> Result<CellId, CodecError>;

    /// 格子中心点
    fn decode(&self, cell: CellId) -> Result<Point, CodecError>;

    fn decode_bounding_box(&self, cell: CellId) -> Result<BoundingBox, CodecError>;

    /// 8 个相邻格子，顺序见 [`NEIGHBOR_ORDER`]
    fn neighbors(&self, cell: CellId) -> Result<[CellId; 8], CodecError>;

    fn precision_of(&self, cell: CellId) -> Result<u8, CodecError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bbox(north: f64, west: f64, south: f64, east: f64) -> BoundingBox {
        BoundingBox {
            top_left: Point::new(north, west),
            bottom_right: Point::new(south, east),
        }
    }

    #[test]
    fn test_contains_includes_edges() {
        let b = bbox(10.0, -5.0, 0.0, 5.0);
        assert!(b.contains(Point::new(10.0, -5.0)));
        assert!(b.contains(Point::new(5.0, 0.0)));
        assert!(!b.contains(Point::new(10.1, 0.0)));
        assert!(!b.contains(Point::new(5.0, 5.1)));
    }

    #[test]
    fn test_contains_across_antimeridian() {
        let b = bbox(10.0, 170.0, 0.0, -170.0);
        assert!(b.contains(Point::new(5.0, 175.0)));
        assert!(b.contains(Point::new(5.0, 180.0)));
        assert!(b.contains(Point::new(5.0, -175.0)));
        assert!(!b.contains(Point::new(5.0, 0.0)));
        assert!(!b.contains(Point::new(11.0, 175.0)));
    }
}
