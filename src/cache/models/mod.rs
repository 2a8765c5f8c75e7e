/// 索引数据模型

pub mod user;

pub use user::{GEONUM_FIELD, Removal, UserRecord};
