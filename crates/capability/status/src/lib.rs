//! 设备状态推导能力。
//!
//! - [`SignalClock`]：每台设备四个独立的信号时钟（连接心跳、继电器 ping、回执、云连接标志）
//! - [`derive_status`]：信号时钟 + 功能标志 → offline / online / active+online 的纯函数
//! - [`Clock`]：墙钟抽象，测试中用 [`ManualClock`] 固定时间

mod clock;
mod derive;
mod signals;

pub use clock::{Clock, ManualClock, SystemClock};
pub use derive::{StatusThresholds, derive_status, is_connection_stale};
pub use signals::SignalClock;
