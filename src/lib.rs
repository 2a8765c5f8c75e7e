use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;

pub mod cache;
pub mod config;
pub mod error;
pub mod geo;
pub mod store;
pub mod utils;

pub use cache::{
    ExpirySweeper, GEONUM_FIELD, LoadGenerator, ProximityIndex, QueryEngine, Removal,
    SweepReport, UserRecord,
};
pub use config::Config;
pub use error::{GeonumError, Result};
pub use geo::{BoundingBox, CellId, GeoCodec, IntGeohash, Point};
pub use store::{Command, CommandExecutor, MemoryExecutor, RedisExecutor, Reply};

/// 邻近索引的上下文对象
///
/// 持有存储连接池、编码器和各个组件。`connect` 打开连接池，
/// 关闭时先 `settle` 等待后台写入完成，再丢弃该对象。
#[derive(Clone)]
pub struct Geonum {
    store: Arc<dyn CommandExecutor>,
    index: Arc<ProximityIndex>,
    query: QueryEngine,
    sweeper: Arc<ExpirySweeper>,
    loadgen: Arc<LoadGenerator>,
}

impl Geonum {
    /// 按配置连接 Redis，使用整数 geohash 编码
    pub async fn connect(config: &Config) -> Result<Self> {
        config.validate()?;
        let store = RedisExecutor::open(&config.redis_url, config.pool_size).await?;
        Ok(Self::with_executor(
            Arc::new(store),
            Arc::new(IntGeohash),
            config,
        ))
    }

    /// 必须在 tokio 运行时内调用
    pub fn with_executor(
        store: Arc<dyn CommandExecutor>,
        codec: Arc<dyn GeoCodec>,
        config: &Config,
    ) -> Self {
        let index = Arc::new(ProximityIndex::new(
            Arc::clone(&store),
            Arc::clone(&codec),
            config.write_shards,
        ));
        let query = QueryEngine::new(Arc::clone(&store), codec);
        let sweeper = Arc::new(ExpirySweeper::new(
            Arc::clone(&index),
            Arc::clone(&store),
            config.expiration_window_ms,
        ));
        let loadgen = Arc::new(LoadGenerator::new(Arc::clone(&index), query.clone()));

        Self {
            store,
            index,
            query,
            sweeper,
            loadgen,
        }
    }

    pub fn bounding_box(&self, cell: CellId) -> Result<BoundingBox> {
        self.query.bounding_box(cell)
    }

    pub fn bounding_box_3x3(&self, cell: CellId) -> Result<BoundingBox> {
        self.query.bounding_box_3x3(cell)
    }

    pub async fn neighbors(&self, cell: CellId) -> Result<Vec<String>> {
        self.query.neighbors(cell).await
    }

    pub async fn neighbors_full(&self, cell: CellId) -> Result<Vec<UserRecord>> {
        self.query.neighbors_full(cell).await
    }

    /// 记录用户位置，返回所在格子；写入在后台完成
    pub fn set(
        &self,
        user_id: &str,
        latitude: f64,
        longitude: f64,
        precision: u8,
        options: UserRecord,
    ) -> Result<CellId> {
        self.index
            .upsert(user_id, Point::new(latitude, longitude), precision, options)
    }

    pub async fn delete(&self, user_id: &str) -> Result<Removal> {
        self.index.remove(user_id).await
    }

    pub async fn get(&self, user_id: &str) -> Result<Option<UserRecord>> {
        self.index.get(user_id).await
    }

    pub async fn cleanup_expired(&self) -> Result<SweepReport> {
        self.sweeper.cleanup_expired().await
    }

    /// 清空整个存储，先等待已提交的写入落地
    pub async fn flush_all(&self) -> Result<()> {
        self.index.settle().await?;
        self.store.execute_one(Command::FlushAll).await?;
        tracing::info!("Flushed store");
        Ok(())
    }

    pub fn generate(&self, cell: CellId, count: usize) -> Result<Vec<(String, CellId)>> {
        self.loadgen.generate(cell, count)
    }

    /// 等待已提交的后台写入执行完毕
    pub async fn settle(&self) -> Result<()> {
        self.index.settle().await
    }

    pub fn spawn_sweeper(
        &self,
        config: &Config,
        shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        Arc::clone(&self.sweeper).spawn(config.sweep_interval(), shutdown)
    }
}
