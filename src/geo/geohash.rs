use super::{BoundingBox, CellId, CodecError, GeoCodec, NEIGHBOR_ORDER, Point};

/// 支持的最大精度（字符数），对应 60 位哈希
pub const MAX_PRECISION: u8 = 12;

const BITS_PER_CHAR: u32 = 5;

/// 整数 geohash 编码器
///
/// 精度 `p` 等价于 `p` 个 base32 geohash 字符，即 `5p` 位交错的经纬度位，
/// 经度在最高位。编号的最高位之上再放一个标记位，这样不同精度的编号互不冲突，
/// 精度也能从编号本身还原。
#[derive(Debug, Clone, Copy, Default)]
pub struct IntGeohash;

/// 格子在经纬两个轴上的行列号
#[derive(Debug, Clone, Copy)]
struct Grid {
    bits: u32,
    lat_idx: u64,
    lon_idx: u64,
}

impl Grid {
    fn lon_bits(&self) -> u32 {
        self.bits.div_ceil(2)
    }

    fn lat_bits(&self) -> u32 {
        self.bits / 2
    }

    fn lon_span(&self) -> f64 {
        360.0 / (1u64 << self.lon_bits()) as f64
    }

    fn lat_span(&self) -> f64 {
        180.0 / (1u64 << self.lat_bits()) as f64
    }

    fn to_cell(self) -> CellId {
        let (lon_bits, lat_bits) = (self.lon_bits(), self.lat_bits());
        let mut hash = 0u64;
        for i in 0..self.bits {
            let bit = if i % 2 == 0 {
                (self.lon_idx >> (lon_bits - 1 - i / 2)) & 1
            } else {
                (self.lat_idx >> (lat_bits - 1 - i / 2)) & 1
            };
            hash = (hash << 1) | bit;
        }
        CellId((1u64 << self.bits) | hash)
    }

    fn from_cell(cell: CellId) -> Result<Self, CodecError> {
        let raw = cell.as_u64();
        if raw == 0 {
            return Err(CodecError::InvalidCell(raw));
        }
        let bits = 63 - raw.leading_zeros();
        if bits == 0 || bits % BITS_PER_CHAR != 0 || bits > MAX_PRECISION as u32 * BITS_PER_CHAR {
            return Err(CodecError::InvalidCell(raw));
        }

        let mut grid = Grid {
            bits,
            lat_idx: 0,
            lon_idx: 0,
        };
        for i in 0..bits {
            let bit = (raw >> (bits - 1 - i)) & 1;
            if i % 2 == 0 {
                grid.lon_idx = (grid.lon_idx << 1) | bit;
            } else {
                grid.lat_idx = (grid.lat_idx << 1) | bit;
            }
        }
        Ok(grid)
    }

    fn bounding_box(&self) -> BoundingBox {
        let west = -180.0 + self.lon_idx as f64 * self.lon_span();
        let south = -90.0 + self.lat_idx as f64 * self.lat_span();
        BoundingBox {
            top_left: Point::new(south + self.lat_span(), west),
            bottom_right: Point::new(south, west + self.lon_span()),
        }
    }

    /// 经度方向首尾相接，纬度方向在两极截断
    fn shifted(&self, d_lat: i64, d_lon: i64) -> Grid {
        let lat_cells = 1i64 << self.lat_bits();
        let lon_cells = 1i64 << self.lon_bits();
        Grid {
            bits: self.bits,
            lat_idx: (self.lat_idx as i64 + d_lat).clamp(0, lat_cells - 1) as u64,
            lon_idx: (self.lon_idx as i64 + d_lon).rem_euclid(lon_cells) as u64,
        }
    }
}

fn axis_index(value: f64, min: f64, span: f64, bits: u32) -> u64 {
    let cells = 1u64 << bits;
    let idx = ((value - min) / span * cells as f64).floor() as u64;
    idx.min(cells - 1)
}

impl GeoCodec for IntGeohash {
    fn encode(&self, point: Point, precision: u8) -> Result<CellId, CodecError> {
        if precision == 0 || precision > MAX_PRECISION {
            return Err(CodecError::InvalidPrecision(precision));
        }
        if !(-90.0..=90.0).contains(&point.latitude) {
            return Err(CodecError::InvalidLatitude(point.latitude));
        }
        if !(-180.0..=180.0).contains(&point.longitude) {
            return Err(CodecError::InvalidLongitude(point.longitude));
        }

        let bits = precision as u32 * BITS_PER_CHAR;
        let mut grid = Grid {
            bits,
            lat_idx: 0,
            lon_idx: 0,
        };
        grid.lon_idx = axis_index(point.longitude, -180.0, 360.0, grid.lon_bits());
        grid.lat_idx = axis_index(point.latitude, -90.0, 180.0, grid.lat_bits());
        Ok(grid.to_cell())
    }

    fn decode(&self, cell: CellId) -> Result<Point, CodecError> {
        let bbox = self.decode_bounding_box(cell)?;
        Ok(Point::new(
            (bbox.north() + bbox.south()) / 2.0,
            (bbox.west() + bbox.east()) / 2.0,
        ))
    }

    fn decode_bounding_box(&self, cell: CellId) -> Result<BoundingBox, CodecError> {
        Ok(Grid::from_cell(cell)?.bounding_box())
    }

    fn neighbors(&self, cell: CellId) -> Result<[CellId; 8], CodecError> {
        let grid = Grid::from_cell(cell)?;
        Ok(NEIGHBOR_ORDER.map(|dir| {
            let (d_lat, d_lon) = dir.offset();
            grid.shifted(d_lat, d_lon).to_cell()
        }))
    }

    fn precision_of(&self, cell: CellId) -> Result<u8, CodecError> {
        let grid = Grid::from_cell(cell)?;
        Ok((grid.bits / BITS_PER_CHAR) as u8)
    }
}
