use std::sync::Arc;

use rand::Rng;
use uuid::Uuid;

use super::index::ProximityIndex;
use super::query::QueryEngine;
use crate::cache::models::UserRecord;
use crate::error::Result;
use crate::geo::{CellId, Point};

/// 默认生成数量
pub const DEFAULT_LOAD_COUNT: usize = 100;

/// 压测数据生成器，只用于开发和测试
pub struct LoadGenerator {
    index: Arc<ProximityIndex>,
    query: QueryEngine,
}

impl LoadGenerator {
    pub fn new(index: Arc<ProximityIndex>, query: QueryEngine) -> Self {
        Self { index, query }
    }

    /// 在 `cell` 的 3x3 区域内随机生成 `count` 个用户，返回 (用户 ID, 格子)
    pub fn generate(&self, cell: CellId, count: usize) -> Result<Vec<(String, CellId)>> {
        let bbox = self.query.bounding_box_3x3(cell)?;
        let precision = self.index.codec().precision_of(cell)?;

        // 跨越 180 度经线时东边界会小于西边界
        let east = if bbox.east() <= bbox.west() {
            bbox.east() + 360.0
        } else {
            bbox.east()
        };

        let mut rng = rand::thread_rng();
        let mut created = Vec::with_capacity(count);
        for n in 0..count {
            let latitude = rng.gen_range(bbox.south()..bbox.north());
            let mut longitude = rng.gen_range(bbox.west()..east);
            if longitude >= 180.0 {
                longitude -= 360.0;
            }

            let user_id = Uuid::new_v4().to_string();
            let options = UserRecord::new()
                .with_field("name", format!("load-{}", n))
                .with_field("generated", true);
            let placed = self.index.upsert(
                &user_id,
                Point::new(latitude, longitude),
                precision,
                options,
            )?;
            created.push((user_id, placed));
        }

        tracing::info!("Generated {} users around cell {}", created.len(), cell);
        Ok(created)
    }
}
