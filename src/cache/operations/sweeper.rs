use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use super::index::ProximityIndex;
use super::writer::RemoveOutcome;
use crate::cache::keys::EXPIRE_KEY;
use crate::error::Result;
use crate::store::{Command, CommandExecutor};
use crate::utils::now_ms;

/// 一次清理的统计
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    /// 过期登记表中命中的条目
    pub expired: usize,
    pub removed: usize,
    /// 已无用户记录，只清掉了过期登记
    pub missing: usize,
    /// 读取过期列表之后又更新过，本轮保留
    pub skipped: usize,
    pub failed: usize,
}

/// 过期清理
///
/// 每个条目单独处理，中途失败的留给下一轮。
pub struct ExpirySweeper {
    index: Arc<ProximityIndex>,
    store: Arc<dyn CommandExecutor>,
    window_ms: i64,
}

impl ExpirySweeper {
    pub fn new(
        index: Arc<ProximityIndex>,
        store: Arc<dyn CommandExecutor>,
        window_ms: i64,
    ) -> Self {
        Self {
            index,
            store,
            window_ms,
        }
    }

    pub async fn cleanup_expired(&self) -> Result<SweepReport> {
        self.cleanup_expired_at(now_ms()).await
    }

    /// 删除最后更新时间不晚于 `now_ms - window_ms` 的用户
    pub async fn cleanup_expired_at(&self, now_ms: i64) -> Result<SweepReport> {
        let cutoff = now_ms - self.window_ms;
        let reply = self
            .store
            .execute_one(Command::ZRangeByScore {
                key: EXPIRE_KEY.to_string(),
                min: f64::NEG_INFINITY,
                max: cutoff as f64,
            })
            .await?;
        let expired = reply.into_members("ZRANGEBYSCORE")?;

        let mut report = SweepReport {
            expired: expired.len(),
            ..SweepReport::default()
        };
        for user_id in expired {
            match self.index.evict(&user_id, cutoff).await {
                Ok(RemoveOutcome::Removed) => report.removed += 1,
                Ok(RemoveOutcome::Missing) => report.missing += 1,
                Ok(RemoveOutcome::Refreshed) => report.skipped += 1,
                Err(e) => {
                    report.failed += 1;
                    warn!("Failed to expire {}: {}", user_id, e);
                }
            }
        }

        if report.expired > 0 {
            info!(
                "Expiry sweep: {} expired, {} removed, {} missing, {} skipped, {} failed",
                report.expired, report.removed, report.missing, report.skipped, report.failed
            );
        }
        Ok(report)
    }

    /// 按固定间隔清理，直到 `shutdown` 变化
    pub fn spawn(
        self: Arc<Self>,
        every: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            loop {
                tokio::select! {
                    _ = shutdown.changed() => {
                        info!("Expiry sweeper shutting down");
                        break;
                    }
                    _ = interval.tick() => {
                        if let Err(e) = self.cleanup_expired().await {
                            warn!("Expiry sweep failed: {}", e);
                        }
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    use crate::cache::keys::{cell_key, user_key};
    use crate::cache::models::UserRecord;
    use crate::error::GeonumError;
    use crate::geo::{IntGeohash, Point};
    use crate::store::{MemoryExecutor, Reply};

    const WINDOW: i64 = 1_800_000;
    const NOW: i64 = 10_000_000;

    fn setup() -> (Arc<MemoryExecutor>, Arc<ProximityIndex>, ExpirySweeper) {
        let store = Arc::new(MemoryExecutor::new());
        let index = Arc::new(ProximityIndex::new(store.clone(), Arc::new(IntGeohash), 4));
        let sweeper = ExpirySweeper::new(Arc::clone(&index), store.clone(), WINDOW);
        (store, index, sweeper)
    }

    #[tokio::test]
    async fn test_window_boundary() {
        let (store, index, sweeper) = setup();
        let point = Point::new(40.7128, -74.0060);
        for (user, updated) in [
            ("stale", NOW - WINDOW - 1),
            ("edge", NOW - WINDOW),
            ("fresh", NOW - WINDOW + 1),
        ] {
            index
                .upsert_at(user, point, 6, UserRecord::new(), updated)
                .unwrap();
        }
        index.settle().await.unwrap();

        let report = sweeper.cleanup_expired_at(NOW).await.unwrap();
        assert_eq!(
            report,
            SweepReport {
                expired: 2,
                removed: 2,
                missing: 0,
                skipped: 0,
                failed: 0
            }
        );

        index.settle().await.unwrap();
        assert_eq!(store.zscore(EXPIRE_KEY, "stale"), None);
        assert_eq!(store.zscore(EXPIRE_KEY, "edge"), None);
        assert_eq!(store.zscore(EXPIRE_KEY, "fresh"), Some((NOW - WINDOW + 1) as f64));
        assert!(index.get("fresh").await.unwrap().is_some());
        assert!(index.get("stale").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_sweep_is_idempotent() {
        let (_store, index, sweeper) = setup();
        index
            .upsert_at("old", Point::new(1.0, 1.0), 5, UserRecord::new(), 0)
            .unwrap();
        index.settle().await.unwrap();

        assert_eq!(sweeper.cleanup_expired_at(NOW).await.unwrap().removed, 1);
        index.settle().await.unwrap();
        assert_eq!(
            sweeper.cleanup_expired_at(NOW).await.unwrap(),
            SweepReport::default()
        );
    }

    #[tokio::test]
    async fn test_orphaned_entry_is_purged() {
        let (store, _index, sweeper) = setup();
        store
            .execute_one(Command::ZAdd {
                key: EXPIRE_KEY.into(),
                member: "ghost".into(),
                score: 0.0,
            })
            .await
            .unwrap();

        let report = sweeper.cleanup_expired_at(NOW).await.unwrap();
        assert_eq!(report.missing, 1);
        assert_eq!(store.zcard(EXPIRE_KEY), 0);
    }

    #[tokio::test]
    async fn test_user_refreshed_after_range_read_is_kept() {
        let (store, index, sweeper) = setup();
        let point = Point::new(40.7128, -74.0060);
        index
            .upsert_at("walker", point, 6, UserRecord::new(), 0)
            .unwrap();
        index.settle().await.unwrap();

        // 过期列表已读出，清理任务入队前用户刷新了位置
        let cutoff = NOW - WINDOW;
        let expired = store
            .execute_one(Command::ZRangeByScore {
                key: EXPIRE_KEY.to_string(),
                min: f64::NEG_INFINITY,
                max: cutoff as f64,
            })
            .await
            .unwrap()
            .into_members("ZRANGEBYSCORE")
            .unwrap();
        assert_eq!(expired, vec!["walker"]);

        let cell = index
            .upsert_at("walker", point, 6, UserRecord::new(), NOW)
            .unwrap();
        assert_eq!(
            index.evict("walker", cutoff).await.unwrap(),
            RemoveOutcome::Refreshed
        );

        index.settle().await.unwrap();
        assert!(index.get("walker").await.unwrap().is_some());
        assert_eq!(store.zscore(EXPIRE_KEY, "walker"), Some(NOW as f64));
        assert_eq!(store.zcard(&cell_key(cell)), 1);
    }

    /// 某个用户的记录读取失败，其余照常处理
    struct FailingGet {
        inner: MemoryExecutor,
        user_id: &'static str,
    }

    #[async_trait]
    impl CommandExecutor for FailingGet {
        async fn execute(&self, batch: Vec<Command>) -> Result<Vec<Reply>> {
            let target = user_key(self.user_id);
            if batch
                .iter()
                .any(|command| matches!(command, Command::Get(key) if *key == target))
            {
                return Err(GeonumError::Unavailable("injected GET failure".into()));
            }
            self.inner.execute(batch).await
        }
    }

    #[tokio::test]
    async fn test_failed_eviction_does_not_stop_sweep() {
        let store = Arc::new(FailingGet {
            inner: MemoryExecutor::new(),
            user_id: "broken",
        });
        let index = Arc::new(ProximityIndex::new(store.clone(), Arc::new(IntGeohash), 4));
        let sweeper = ExpirySweeper::new(Arc::clone(&index), store.clone(), WINDOW);

        let point = Point::new(40.7128, -74.0060);
        for user in ["a", "b"] {
            index
                .upsert_at(user, point, 6, UserRecord::new(), 0)
                .unwrap();
        }
        index.settle().await.unwrap();
        // 写队列同样要读记录，直接写入底层存储
        store
            .inner
            .execute(vec![
                Command::Set(user_key("broken"), UserRecord::new().to_json().unwrap()),
                Command::ZAdd {
                    key: EXPIRE_KEY.into(),
                    member: "broken".into(),
                    score: 0.0,
                },
            ])
            .await
            .unwrap();

        let report = sweeper.cleanup_expired_at(NOW).await.unwrap();
        assert_eq!(report.expired, 3);
        assert_eq!(report.removed, 2);
        assert_eq!(report.failed, 1);

        index.settle().await.unwrap();
        assert_eq!(store.inner.zscore(EXPIRE_KEY, "a"), None);
        assert_eq!(store.inner.zscore(EXPIRE_KEY, "b"), None);
        assert_eq!(store.inner.zscore(EXPIRE_KEY, "broken"), Some(0.0));
        assert!(store.inner.get(&user_key("broken")).is_some());
    }

    #[tokio::test]
    async fn test_spawned_sweeper_stops_on_shutdown() {
        let (_store, _index, sweeper) = setup();
        let (tx, rx) = watch::channel(false);
        let handle = Arc::new(sweeper).spawn(Duration::from_millis(10), rx);

        tokio::time::sleep(Duration::from_millis(30)).await;
        tx.send(true).unwrap();
        handle.await.unwrap();
    }
}
