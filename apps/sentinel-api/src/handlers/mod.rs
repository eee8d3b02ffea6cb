//! Handlers 模块

pub mod activity;
pub mod commands;
pub mod devices;
pub mod groups;
pub mod health;
pub mod metrics;
pub mod realtime;

pub use activity::*;
pub use commands::*;
pub use devices::*;
pub use groups::*;
pub use health::*;
pub use metrics::*;
pub use realtime::*;
