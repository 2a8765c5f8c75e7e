use std::collections::HashSet;
use std::sync::Arc;

use crate::cache::keys::{cell_key, user_key};
use crate::cache::models::UserRecord;
use crate::error::Result;
use crate::geo::{BoundingBox, CellId, GeoCodec};
use crate::store::{Command, CommandExecutor};

/// 3x3 区域中西北格子的下标
const NORTH_WEST: usize = 5;
/// 3x3 区域中东南格子的下标
const SOUTH_EAST: usize = 8;

/// 邻近查询
#[derive(Clone)]
pub struct QueryEngine {
    store: Arc<dyn CommandExecutor>,
    codec: Arc<dyn GeoCodec>,
}

impl QueryEngine {
    pub fn new(store: Arc<dyn CommandExecutor>, codec: Arc<dyn GeoCodec>) -> Self {
        Self { store, codec }
    }

    pub fn bounding_box(&self, cell: CellId) -> Result<BoundingBox> {
        Ok(self.codec.decode_bounding_box(cell)?)
    }

    /// 格子本身加上 8 个邻居，邻居顺序由编码器约定
    pub fn region(&self, cell: CellId) -> Result<[CellId; 9]> {
        let neighbors = self.codec.neighbors(cell)?;
        let mut region = [cell; 9];
        region[1..].copy_from_slice(&neighbors);
        Ok(region)
    }

    /// 3x3 区域的外接矩形
    pub fn bounding_box_3x3(&self, cell: CellId) -> Result<BoundingBox> {
        let region = self.region(cell)?;
        let north_west = self.codec.decode_bounding_box(region[NORTH_WEST])?;
        let south_east = self.codec.decode_bounding_box(region[SOUTH_EAST])?;
        Ok(BoundingBox {
            top_left: north_west.top_left,
            bottom_right: south_east.bottom_right,
        })
    }

    /// 3x3 区域内的用户 ID。
    ///
    /// 按区域顺序逐格拼接，每格内由近到远，不做全局排序。
    pub async fn neighbors(&self, cell: CellId) -> Result<Vec<String>> {
        let region = self.region(cell)?;
        // 两极处邻居可能与自身重复，只读一次
        let mut seen = HashSet::with_capacity(region.len());
        let batch: Vec<Command> = region
            .into_iter()
            .filter(|c| seen.insert(*c))
            .map(|c| Command::ZRange(cell_key(c)))
            .collect();

        let mut ids = Vec::new();
        for reply in self.store.execute(batch).await? {
            ids.extend(reply.into_members("ZRANGE")?);
        }
        Ok(ids)
    }

    /// 3x3 区域内的用户记录，记录缺失的用户直接跳过
    pub async fn neighbors_full(&self, cell: CellId) -> Result<Vec<UserRecord>> {
        let ids = self.neighbors(cell).await?;
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let batch = ids.iter().map(|id| Command::Get(user_key(id))).collect();
        let replies = self.store.execute(batch).await?;

        let mut records = Vec::with_capacity(ids.len());
        for reply in replies {
            if let Some(json) = reply.into_text("GET")? {
                records.push(UserRecord::from_json(&json)?);
            }
        }
        if records.len() < ids.len() {
            tracing::debug!(
                "Skipped {} members of cell {} without a record",
                ids.len() - records.len(),
                cell
            );
        }
        Ok(records)
    }
}
