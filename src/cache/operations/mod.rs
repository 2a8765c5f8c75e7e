/// 索引操作
/// 写入、查询、过期清理和压测数据生成

pub mod index;
pub mod loadgen;
pub mod query;
pub mod sweeper;
pub mod writer;

// 重新导出常用操作
pub use index::ProximityIndex;
pub use loadgen::{DEFAULT_LOAD_COUNT, LoadGenerator};
pub use query::QueryEngine;
pub use sweeper::{ExpirySweeper, SweepReport};
pub use writer::WriteQueue;
