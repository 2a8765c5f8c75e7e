/// 格子成员集合键前缀
const CELL_PREFIX: &str = "geonum:";

/// 用户记录键前缀
const USER_PREFIX: &str = "geonum_user:";

/// 全局过期登记表（有序集合，分数为最后更新时间毫秒）
pub const EXPIRE_KEY: &str = "geonum_expire";

/// 生成格子成员集合键
pub fn cell_key(cell: impl std::fmt::Display) -> String {
    format!("{}{}", CELL_PREFIX, cell)
}

/// 生成用户记录键
pub fn user_key(user_id: &str) -> String {
    format!("{}{}", USER_PREFIX, user_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::CellId;

    #[test]
    fn test_key_layout() {
        assert_eq!(cell_key(CellId(1234)), "geonum:1234");
        assert_eq!(user_key("u1"), "geonum_user:u1");
        assert_eq!(EXPIRE_KEY, "geonum_expire");
    }
}
