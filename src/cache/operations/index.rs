use std::sync::Arc;

use tokio::sync::oneshot;

use super::writer::{RemoveMode, RemoveOutcome, UpsertJob, WriteJob, WriteQueue};
use crate::cache::keys::user_key;
use crate::cache::models::{Removal, UserRecord};
use crate::error::{GeonumError, Result};
use crate::geo::{CellId, GeoCodec, Point};
use crate::store::{Command, CommandExecutor};
use crate::utils::{haversine, now_ms};

/// 邻近索引
///
/// 维护三份数据：每个格子的成员有序集合（分数为到格子中心的距离）、
/// 用户记录、全局过期登记表。写入都交给 [`WriteQueue`] 在后台执行。
pub struct ProximityIndex {
    store: Arc<dyn CommandExecutor>,
    codec: Arc<dyn GeoCodec>,
    writes: WriteQueue,
}

impl ProximityIndex {
    pub fn new(
        store: Arc<dyn CommandExecutor>,
        codec: Arc<dyn GeoCodec>,
        write_shards: usize,
    ) -> Self {
        let writes = WriteQueue::spawn(Arc::clone(&store), write_shards);
        Self {
            store,
            codec,
            writes,
        }
    }

    pub fn codec(&self) -> &Arc<dyn GeoCodec> {
        &self.codec
    }

    /// 更新用户位置，返回所在格子。
    ///
    /// 编码错误立即返回。写入在后台执行，调用方不会得知写入是否成功。
    pub fn upsert(
        &self,
        user_id: &str,
        point: Point,
        precision: u8,
        options: UserRecord,
    ) -> Result<CellId> {
        self.upsert_at(user_id, point, precision, options, now_ms())
    }

    pub(crate) fn upsert_at(
        &self,
        user_id: &str,
        point: Point,
        precision: u8,
        options: UserRecord,
        updated_ms: i64,
    ) -> Result<CellId> {
        let cell = self.codec.encode(point, precision)?;
        let center = self.codec.decode(cell)?;
        let distance = haversine(point, center);

        let mut record = options;
        record.set_geonum(cell);

        self.writes.submit(
            user_id,
            WriteJob::Upsert(UpsertJob {
                user_id: user_id.to_string(),
                cell,
                distance,
                record_json: record.to_json()?,
                updated_ms,
            }),
        )?;
        tracing::debug!("Queued {} for cell {} ({:.3} km from center)", user_id, cell, distance);

        Ok(cell)
    }

    /// 删除用户。查到记录即返回 `Found`，实际删除在后台完成。
    pub async fn remove(&self, user_id: &str) -> Result<Removal> {
        // Delete 方式不会出现 Refreshed
        match self.submit_remove(user_id, RemoveMode::Delete).await? {
            RemoveOutcome::Removed => Ok(Removal::Found),
            RemoveOutcome::Missing | RemoveOutcome::Refreshed => Ok(Removal::NotFound),
        }
    }

    /// 过期清理用。在该用户的写队列里重新核对过期时间，
    /// 晚于 `cutoff_ms` 更新过的用户保留。
    pub(crate) async fn evict(&self, user_id: &str, cutoff_ms: i64) -> Result<RemoveOutcome> {
        self.submit_remove(user_id, RemoveMode::Expire { cutoff_ms })
            .await
    }

    async fn submit_remove(&self, user_id: &str, mode: RemoveMode) -> Result<RemoveOutcome> {
        let (reply, lookup) = oneshot::channel();
        self.writes.submit(
            user_id,
            WriteJob::Remove {
                user_id: user_id.to_string(),
                mode,
                reply,
            },
        )?;
        lookup.await.map_err(|_| GeonumError::WriterClosed)?
    }

    /// 直接读取用户记录，不经过写队列
    pub async fn get(&self, user_id: &str) -> Result<Option<UserRecord>> {
        let reply = self.store.execute_one(Command::Get(user_key(user_id))).await?;
        reply
            .into_text("GET")?
            .map(|json| UserRecord::from_json(&json))
            .transpose()
    }

    pub async fn settle(&self) -> Result<()> {
        self.writes.settle().await
    }
}
