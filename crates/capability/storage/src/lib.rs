//! # Sentinel Storage 模块
//!
//! 设备与分组的持久化抽象，支持内存与 PostgreSQL 两种后端。
//!
//! ## 架构设计
//!
//! 1. **接口抽象层** (`traits.rs`)：DeviceStore / GroupStore 异步 Trait
//! 2. **数据模型层** (`models.rs`)：DeviceRecord / GroupRecord 及更新输入
//! 3. **错误处理层** (`error.rs`)：统一的存储错误类型（区分冲突）
//! 4. **验证辅助层** (`validation.rs`)：租户校验
//! 5. **连接管理层** (`connection.rs`)：连接池与建表脚本
//! 6. **实现层**：
//!    - `in_memory/`：`RwLock<HashMap>`，键为 `tenant:{t}:device:{d}`，用于测试与无数据库运行
//!    - `postgres/`：sqlx 参数化查询，`relay_config` 以 JSON 文本存储，分组成员为 `text[]`
//!
//! ## 多租户安全
//!
//! 设备 ID 只在租户内唯一：所有查询都带 `tenant_id` 条件，
//! 两个租户可以各自拥有同名设备而互不可见。
//!
//! 只有静态资料落库；状态、功能、继电器真值与信号时钟在重启后从 offline 重新推导。

pub mod connection;
pub mod error;
pub mod in_memory;
pub mod models;
pub mod postgres;
pub mod traits;
pub mod validation;

pub use connection::*;
pub use error::*;
pub use models::*;
pub use traits::*;
pub use validation::*;

pub use in_memory::{InMemoryDeviceStore, InMemoryGroupStore};
pub use postgres::{PgDeviceStore, PgGroupStore};
