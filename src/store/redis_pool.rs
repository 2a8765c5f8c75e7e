use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use redis::{Client as RedisClient, Value, aio::MultiplexedConnection, from_redis_value};

use super::{Command, CommandExecutor, Reply};
use crate::error::Result;

/// 基于 Redis 的命令执行器
///
/// 启动时建立固定数量的多路复用连接，按轮询方式取用，每批命令作为一个 pipeline 发送。
pub struct RedisExecutor {
    connections: Vec<MultiplexedConnection>,
    next: AtomicUsize,
}

impl RedisExecutor {
    /// 打开连接池
    pub async fn open(redis_url: &str, pool_size: usize) -> Result<Self> {
        let client = RedisClient::open(redis_url)?;
        Self::connect(&client, pool_size).await
    }

    pub async fn connect(client: &RedisClient, pool_size: usize) -> Result<Self> {
        let size = pool_size.max(1);
        let mut connections = Vec::with_capacity(size);
        for _ in 0..size {
            connections.push(client.get_multiplexed_async_connection().await?);
        }
        tracing::info!("Redis connection pool ready with {} connections", size);

        Ok(Self {
            connections,
            next: AtomicUsize::new(0),
        })
    }

    fn connection(&self) -> MultiplexedConnection {
        let idx = self.next.fetch_add(1, Ordering::Relaxed) % self.connections.len();
        self.connections[idx].clone()
    }
}

/// Redis 的分数参数，无穷用 `-inf` / `+inf`
fn score_arg(score: f64) -> String {
    if score == f64::INFINITY {
        "+inf".to_string()
    } else if score == f64::NEG_INFINITY {
        "-inf".to_string()
    } else {
        score.to_string()
    }
}

fn to_reply(command: &Command, value: Value) -> Result<Reply> {
    let reply = match command {
        Command::Get(_) => match from_redis_value::<Option<String>>(&value)? {
            Some(text) => Reply::Text(text),
            None => Reply::Nil,
        },
        Command::Set(..) | Command::FlushAll => Reply::Ok,
        Command::Del(_) | Command::ZAdd { .. } | Command::ZRem { .. } => {
            Reply::Int(from_redis_value(&value)?)
        }
        Command::ZScore { .. } => match from_redis_value::<Option<f64>>(&value)? {
            Some(score) => Reply::Score(score),
            None => Reply::Nil,
        },
        Command::ZRange(_) | Command::ZRangeByScore { .. } => {
            Reply::Members(from_redis_value(&value)?)
        }
    };
    Ok(reply)
}

#[async_trait]
impl CommandExecutor for RedisExecutor {
    async fn execute(&self, batch: Vec<Command>) -> Result<Vec<Reply>> {
        if batch.is_empty() {
            return Ok(Vec::new());
        }

        let mut pipe = redis::pipe();
        for command in &batch {
            match command {
                Command::Get(key) => {
                    pipe.cmd("GET").arg(key);
                }
                Command::Set(key, value) => {
                    pipe.cmd("SET").arg(key).arg(value);
                }
                Command::Del(key) => {
                    pipe.cmd("DEL").arg(key);
                }
                Command::ZAdd { key, member, score } => {
                    pipe.cmd("ZADD").arg(key).arg(score_arg(*score)).arg(member);
                }
                Command::ZRem { key, member } => {
                    pipe.cmd("ZREM").arg(key).arg(member);
                }
                Command::ZScore { key, member } => {
                    pipe.cmd("ZSCORE").arg(key).arg(member);
                }
                Command::ZRange(key) => {
                    pipe.cmd("ZRANGE").arg(key).arg(0).arg(-1);
                }
                Command::ZRangeByScore { key, min, max } => {
                    pipe.cmd("ZRANGEBYSCORE")
                        .arg(key)
                        .arg(score_arg(*min))
                        .arg(score_arg(*max));
                }
                Command::FlushAll => {
                    pipe.cmd("FLUSHALL");
                }
            }
        }

        let mut conn = self.connection();
        let values: Vec<Value> = pipe.query_async(&mut conn).await?;
        tracing::debug!("Executed pipeline of {} commands", batch.len());

        batch
            .iter()
            .zip(values)
            .map(|(command, value)| to_reply(command, value))
            .collect()
    }
}
