/// 缓存键模块
/// 提供索引用到的键生成函数

pub mod geonum_keys;

pub use geonum_keys::{EXPIRE_KEY, cell_key, user_key};
