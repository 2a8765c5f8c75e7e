use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use futures_util::future::join_all;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::cache::keys::{EXPIRE_KEY, cell_key, user_key};
use crate::cache::models::UserRecord;
use crate::error::{GeonumError, Result};
use crate::geo::CellId;
use crate::store::{Command, CommandExecutor};

/// 一次位置更新要落库的内容
#[derive(Debug)]
pub(crate) struct UpsertJob {
    pub user_id: String,
    pub cell: CellId,
    pub distance: f64,
    pub record_json: String,
    pub updated_ms: i64,
}

/// 删除方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RemoveMode {
    Delete,
    /// 过期清理：只删除最后更新时间不晚于 `cutoff_ms` 的用户，
    /// 记录已不存在时也清掉过期登记
    Expire { cutoff_ms: i64 },
}

/// 后台删除的查找结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RemoveOutcome {
    Removed,
    Missing,
    /// 过期清理排队期间用户又更新了位置，保留不动
    Refreshed,
}

pub(crate) enum WriteJob {
    Upsert(UpsertJob),
    Remove {
        user_id: String,
        mode: RemoveMode,
        reply: oneshot::Sender<Result<RemoveOutcome>>,
    },
    Barrier(oneshot::Sender<()>),
}

/// 用户当前记录的状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Prior {
    Missing,
    /// 有记录但没有可用的 geonum 字段
    NoCell,
    Cell(CellId),
}

/// 后台写队列
///
/// 按用户 ID 哈希分片，每个分片由一个任务串行处理，同一用户的写入
/// 严格按提交顺序执行，不同用户之间并行。写入失败只记日志，不通知调用方。
pub struct WriteQueue {
    shards: Vec<mpsc::UnboundedSender<WriteJob>>,
}

impl WriteQueue {
    /// 启动分片任务，必须在 tokio 运行时内调用
    pub fn spawn(store: Arc<dyn CommandExecutor>, shard_count: usize) -> Self {
        let shards = (0..shard_count.max(1))
            .map(|shard| {
                let (tx, rx) = mpsc::unbounded_channel();
                tokio::spawn(run_shard(shard, Arc::clone(&store), rx));
                tx
            })
            .collect();
        Self { shards }
    }

    fn shard_for(&self, user_id: &str) -> &mpsc::UnboundedSender<WriteJob> {
        let mut hasher = DefaultHasher::new();
        user_id.hash(&mut hasher);
        let idx = (hasher.finish() % self.shards.len() as u64) as usize;
        &self.shards[idx]
    }

    pub(crate) fn submit(&self, user_id: &str, job: WriteJob) -> Result<()> {
        self.shard_for(user_id)
            .send(job)
            .map_err(|_| GeonumError::WriterClosed)
    }

    /// 等待调用前提交的所有写入执行完毕（成功或丢弃）
    pub async fn settle(&self) -> Result<()> {
        let mut waits = Vec::with_capacity(self.shards.len());
        for shard in &self.shards {
            let (tx, rx) = oneshot::channel();
            shard
                .send(WriteJob::Barrier(tx))
                .map_err(|_| GeonumError::WriterClosed)?;
            waits.push(rx);
        }
        for done in join_all(waits).await {
            done.map_err(|_| GeonumError::WriterClosed)?;
        }
        Ok(())
    }
}

async fn run_shard(
    shard: usize,
    store: Arc<dyn CommandExecutor>,
    mut jobs: mpsc::UnboundedReceiver<WriteJob>,
) {
    while let Some(job) = jobs.recv().await {
        match job {
            WriteJob::Upsert(job) => {
                if let Err(e) = apply_upsert(store.as_ref(), &job).await {
                    warn!("Dropped location update for {}: {}", job.user_id, e);
                }
            }
            WriteJob::Remove {
                user_id,
                mode,
                reply,
            } => apply_remove(store.as_ref(), &user_id, mode, reply).await,
            WriteJob::Barrier(done) => {
                let _ = done.send(());
            }
        }
    }
    debug!("Write shard {} stopped", shard);
}

/// 读出当前记录里的格子
async fn prior_cell(store: &dyn CommandExecutor, user_id: &str) -> Result<Prior> {
    let reply = store.execute_one(Command::Get(user_key(user_id))).await?;
    let Some(json) = reply.into_text("GET")? else {
        return Ok(Prior::Missing);
    };
    Ok(match UserRecord::from_json(&json)?.geonum() {
        Some(cell) => Prior::Cell(cell),
        None => Prior::NoCell,
    })
}

async fn expiry_score(store: &dyn CommandExecutor, user_id: &str) -> Result<Option<f64>> {
    let reply = store
        .execute_one(Command::ZScore {
            key: EXPIRE_KEY.to_string(),
            member: user_id.to_string(),
        })
        .await?;
    reply.into_score("ZSCORE")
}

async fn apply_upsert(store: &dyn CommandExecutor, job: &UpsertJob) -> Result<()> {
    // 旧记录损坏时直接覆盖，旧格子里的成员只能等过期清理
    let prior = match prior_cell(store, &job.user_id).await {
        Ok(prior) => prior,
        Err(GeonumError::Record(e)) => {
            warn!("Overwriting malformed record for {}: {}", job.user_id, e);
            Prior::NoCell
        }
        Err(e) => return Err(e),
    };

    let mut batch = Vec::with_capacity(4);
    if let Prior::Cell(old) = prior {
        if old != job.cell {
            batch.push(Command::ZRem {
                key: cell_key(old),
                member: job.user_id.clone(),
            });
        }
    }
    batch.push(Command::Set(user_key(&job.user_id), job.record_json.clone()));
    batch.push(Command::ZAdd {
        key: cell_key(job.cell),
        member: job.user_id.clone(),
        score: job.distance,
    });
    batch.push(Command::ZAdd {
        key: EXPIRE_KEY.to_string(),
        member: job.user_id.clone(),
        score: job.updated_ms as f64,
    });

    store.execute(batch).await?;
    debug!("Indexed {} in cell {}", job.user_id, job.cell);
    Ok(())
}

async fn apply_remove(
    store: &dyn CommandExecutor,
    user_id: &str,
    mode: RemoveMode,
    reply: oneshot::Sender<Result<RemoveOutcome>>,
) {
    if let RemoveMode::Expire { cutoff_ms } = mode {
        match expiry_score(store, user_id).await {
            Ok(Some(score)) if score > cutoff_ms as f64 => {
                debug!("Kept {}: refreshed after expiry cutoff", user_id);
                let _ = reply.send(Ok(RemoveOutcome::Refreshed));
                return;
            }
            Ok(_) => {}
            Err(e) => {
                let _ = reply.send(Err(e));
                return;
            }
        }
    }

    let cell = match prior_cell(store, user_id).await {
        Ok(Prior::Cell(cell)) => Some(cell),
        Ok(Prior::NoCell) => None,
        Ok(Prior::Missing) => {
            if matches!(mode, RemoveMode::Expire { .. }) {
                let purge = Command::ZRem {
                    key: EXPIRE_KEY.to_string(),
                    member: user_id.to_string(),
                };
                if let Err(e) = store.execute_one(purge).await {
                    warn!("Failed to purge expiry entry for {}: {}", user_id, e);
                }
            }
            let _ = reply.send(Ok(RemoveOutcome::Missing));
            return;
        }
        Err(e) => {
            let _ = reply.send(Err(e));
            return;
        }
    };

    // 调用方只等查找结果，删除在后台继续
    let _ = reply.send(Ok(RemoveOutcome::Removed));

    let mut batch = vec![Command::Del(user_key(user_id))];
    if let Some(cell) = cell {
        batch.push(Command::ZRem {
            key: cell_key(cell),
            member: user_id.to_string(),
        });
    }
    batch.push(Command::ZRem {
        key: EXPIRE_KEY.to_string(),
        member: user_id.to_string(),
    });

    if let Err(e) = store.execute(batch).await {
        warn!("Dropped removal of {}: {}", user_id, e);
    } else {
        debug!("Removed {} from index", user_id);
    }
}
