/// 存储命令层
/// 索引只通过这里的命令集合访问键值存储

pub mod memory;
pub mod redis_pool;

use async_trait::async_trait;

use crate::error::{GeonumError, Result};

pub use self::memory::MemoryExecutor;
pub use self::redis_pool::RedisExecutor;

/// 索引用到的存储命令
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Get(String),
    Set(String, String),
    Del(String),
    ZAdd {
        key: String,
        member: String,
        score: f64,
    },
    ZRem {
        key: String,
        member: String,
    },
    ZScore {
        key: String,
        member: String,
    },
    /// 整个有序集合，按分数升序
    ZRange(String),
    /// 闭区间 [min, max]，按分数升序
    ZRangeByScore {
        key: String,
        min: f64,
        max: f64,
    },
    FlushAll,
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::Get(_) => "GET",
            Command::Set(..) => "SET",
            Command::Del(_) => "DEL",
            Command::ZAdd { .. } => "ZADD",
            Command::ZRem { .. } => "ZREM",
            Command::ZScore { .. } => "ZSCORE",
            Command::ZRange(_) => "ZRANGE",
            Command::ZRangeByScore { .. } => "ZRANGEBYSCORE",
            Command::FlushAll => "FLUSHALL",
        }
    }
}

/// 命令回复
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Nil,
    Ok,
    Int(i64),
    Score(f64),
    Text(String),
    Members(Vec<String>),
}

impl Reply {
    pub fn into_text(self, command: &'static str) -> Result<Option<String>> {
        match self {
            Reply::Nil => Ok(None),
            Reply::Text(s) => Ok(Some(s)),
            _ => Err(GeonumError::UnexpectedReply { command }),
        }
    }

    pub fn into_score(self, command: &'static str) -> Result<Option<f64>> {
        match self {
            Reply::Nil => Ok(None),
            Reply::Score(score) => Ok(Some(score)),
            _ => Err(GeonumError::UnexpectedReply { command }),
        }
    }

    pub fn into_members(self, command: &'static str) -> Result<Vec<String>> {
        match self {
            Reply::Members(members) => Ok(members),
            Reply::Nil => Ok(Vec::new()),
            _ => Err(GeonumError::UnexpectedReply { command }),
        }
    }
}

/// 命令执行器
///
/// 一批命令作为一个 pipeline 发送，回复按提交顺序返回。
/// 批与批之间没有顺序保证。
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    async fn execute(&self, batch: Vec<Command>) -> Result<Vec<Reply>>;

    /// 执行单条命令
    async fn execute_one(&self, command: Command) -> Result<Reply> {
        let name = command.name();
        self.execute(vec![command])
            .await?
            .pop()
            .ok_or(GeonumError::UnexpectedReply { command: name })
    }
}
