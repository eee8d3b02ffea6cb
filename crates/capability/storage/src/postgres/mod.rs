//! # PostgreSQL 存储实现模块
//!
//! ## 设计原则
//!
//! 1. **参数化查询**：所有 SQL 查询使用参数绑定，防止 SQL 注入
//! 2. **多租户隔离**：所有租户级查询都包含 `tenant_id` 条件
//! 3. **复合主键**：`(tenant_id, device_id)` / `(tenant_id, group_id)`，
//!    重复插入由唯一约束转换为冲突错误
//!
//! ## 数据库模式要求
//!
//! 表结构见 `migrations/0001_init.sql`：
//! - `devices`：设备表（relay_config 为 JSON 文本）
//! - `device_groups`：分组表（device_ids 为 `text[]`）

pub mod device;
pub mod group;

pub use device::*;
pub use group::*;
