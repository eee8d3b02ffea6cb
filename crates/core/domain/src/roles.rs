//! 角色码。
//!
//! 角色有序：viewer < operator < admin，高等级角色包含低等级的全部能力。

/// 只读：查看设备、分组、活动记录。
pub const VIEWER: &str = "viewer";
/// 操作员：下发命令、执行场景、同步状态、模拟信号。
pub const OPERATOR: &str = "operator";
/// 管理员：注册/删除设备、维护分组。
pub const ADMIN: &str = "admin";

/// 角色等级（未知角色为 0，不授予任何能力）。
pub fn rank(role: &str) -> u8 {
    match role.trim().to_ascii_lowercase().as_str() {
        VIEWER => 1,
        OPERATOR => 2,
        ADMIN => 3,
        _ => 0,
    }
}
