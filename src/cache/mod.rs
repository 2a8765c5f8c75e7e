// 邻近索引模块
// 包含存储键、记录结构和索引操作

pub mod keys;
pub mod models;
pub mod operations;

// 重新导出常用类型
pub use models::{GEONUM_FIELD, Removal, UserRecord};
pub use operations::{
    ExpirySweeper, LoadGenerator, ProximityIndex, QueryEngine, SweepReport, WriteQueue,
};
