use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{Command, CommandExecutor, Reply};
use crate::error::{GeonumError, Result};

#[derive(Default)]
struct MemoryState {
    strings: HashMap<String, String>,
    zsets: HashMap<String, HashMap<String, f64>>,
}

impl MemoryState {
    fn sorted(&self, key: &str, min: f64, max: f64) -> Vec<String> {
        let Some(set) = self.zsets.get(key) else {
            return Vec::new();
        };
        let mut entries: Vec<(&String, f64)> = set
            .iter()
            .filter(|(_, score)| **score >= min && **score <= max)
            .map(|(member, score)| (member, *score))
            .collect();
        // 与 Redis 一致：分数相同按成员字典序
        entries.sort_by(|a, b| a.1.total_cmp(&b.1).then_with(|| a.0.cmp(b.0)));
        entries.into_iter().map(|(m, _)| m.clone()).collect()
    }

    fn apply(&mut self, command: Command) -> Reply {
        match command {
            Command::Get(key) => match self.strings.get(&key) {
                Some(value) => Reply::Text(value.clone()),
                None => Reply::Nil,
            },
            Command::Set(key, value) => {
                self.zsets.remove(&key);
                self.strings.insert(key, value);
                Reply::Ok
            }
            Command::Del(key) => {
                let removed = self.strings.remove(&key).is_some() as i64
                    + self.zsets.remove(&key).is_some() as i64;
                Reply::Int(removed)
            }
            Command::ZAdd { key, member, score } => {
                let set = self.zsets.entry(key).or_default();
                Reply::Int(set.insert(member, score).is_none() as i64)
            }
            Command::ZRem { key, member } => {
                let Some(set) = self.zsets.get_mut(&key) else {
                    return Reply::Int(0);
                };
                let removed = set.remove(&member).is_some();
                if set.is_empty() {
                    self.zsets.remove(&key);
                }
                Reply::Int(removed as i64)
            }
            Command::ZScore { key, member } => {
                match self.zsets.get(&key).and_then(|set| set.get(&member)) {
                    Some(score) => Reply::Score(*score),
                    None => Reply::Nil,
                }
            }
            Command::ZRange(key) => {
                Reply::Members(self.sorted(&key, f64::NEG_INFINITY, f64::INFINITY))
            }
            Command::ZRangeByScore { key, min, max } => Reply::Members(self.sorted(&key, min, max)),
            Command::FlushAll => {
                self.strings.clear();
                self.zsets.clear();
                Reply::Ok
            }
        }
    }
}

/// 进程内存储，供测试和本地开发使用
///
/// 只实现索引用到的命令子集。可以切换为离线状态来模拟存储不可用。
#[derive(Default)]
pub struct MemoryExecutor {
    state: Mutex<MemoryState>,
    offline: AtomicBool,
}

impl MemoryExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn zscore(&self, key: &str, member: &str) -> Option<f64> {
        self.state.lock().zsets.get(key)?.get(member).copied()
    }

    pub fn zcard(&self, key: &str) -> usize {
        self.state.lock().zsets.get(key).map_or(0, |set| set.len())
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.state.lock().strings.get(key).cloned()
    }

    /// 当前所有有序集合的键
    pub fn zset_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.state.lock().zsets.keys().cloned().collect();
        keys.sort();
        keys
    }
}

#[async_trait]
impl CommandExecutor for MemoryExecutor {
    async fn execute(&self, batch: Vec<Command>) -> Result<Vec<Reply>> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(GeonumError::Unavailable("memory store is offline".into()));
        }
        let mut state = self.state.lock();
        Ok(batch.into_iter().map(|command| state.apply(command)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn zadd(key: &str, member: &str, score: f64) -> Command {
        Command::ZAdd {
            key: key.into(),
            member: member.into(),
            score,
        }
    }

    #[tokio::test]
    async fn test_sorted_set_ordering() {
        let store = MemoryExecutor::new();
        store
            .execute(vec![
                zadd("z", "far", 3.0),
                zadd("z", "near", 1.0),
                zadd("z", "b", 2.0),
                zadd("z", "a", 2.0),
            ])
            .await
            .unwrap();

        let reply = store.execute_one(Command::ZRange("z".into())).await.unwrap();
        assert_eq!(
            reply,
            Reply::Members(vec!["near".into(), "a".into(), "b".into(), "far".into()])
        );

        let reply = store
            .execute_one(Command::ZRangeByScore {
                key: "z".into(),
                min: f64::NEG_INFINITY,
                max: 2.0,
            })
            .await
            .unwrap();
        assert_eq!(
            reply,
            Reply::Members(vec!["near".into(), "a".into(), "b".into()])
        );
    }

    #[tokio::test]
    async fn test_zadd_updates_score_and_zrem_drops_empty_set() {
        let store = MemoryExecutor::new();
        let replies = store
            .execute(vec![zadd("z", "m", 1.0), zadd("z", "m", 5.0)])
            .await
            .unwrap();
        assert_eq!(replies, vec![Reply::Int(1), Reply::Int(0)]);
        assert_eq!(store.zscore("z", "m"), Some(5.0));
        let reply = store
            .execute_one(Command::ZScore {
                key: "z".into(),
                member: "m".into(),
            })
            .await
            .unwrap();
        assert_eq!(reply, Reply::Score(5.0));

        let reply = store
            .execute_one(Command::ZRem {
                key: "z".into(),
                member: "m".into(),
            })
            .await
            .unwrap();
        assert_eq!(reply, Reply::Int(1));
        assert!(store.zset_keys().is_empty());
    }

    #[tokio::test]
    async fn test_replies_follow_submission_order() {
        let store = MemoryExecutor::new();
        let replies = store
            .execute(vec![
                Command::Get("k".into()),
                Command::Set("k".into(), "v".into()),
                Command::Get("k".into()),
                Command::Del("k".into()),
                Command::Del("k".into()),
            ])
            .await
            .unwrap();
        assert_eq!(
            replies,
            vec![
                Reply::Nil,
                Reply::Ok,
                Reply::Text("v".into()),
                Reply::Int(1),
                Reply::Int(0),
            ]
        );
    }

    #[tokio::test]
    async fn test_offline_store_fails_batches() {
        let store = MemoryExecutor::new();
        store.set_offline(true);
        let err = store.execute(vec![Command::FlushAll]).await.unwrap_err();
        assert!(matches!(err, GeonumError::Unavailable(_)));

        store.set_offline(false);
        assert!(store.execute(vec![Command::FlushAll]).await.is_ok());
    }
}
