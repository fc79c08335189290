//! 仿真核心模块
//!
//! 此模块包含事件驱动仿真的核心组件，如仿真时间、事件、世界和仿真器，
//! 以及场景文件的加载与装配。

// 子模块声明
mod event;
mod scenario;
mod scheduled_event;
mod simulator;
mod time;

// 重新导出公共接口
pub use event::{Event, World};
pub use scenario::{
    ContactSpec, MessageSpec, NodeDefaults, NodeSpec, SCHEMA_VERSION, ScenarioMeta, ScenarioRun,
    ScenarioSpec, TopologySpec,
};
pub use scheduled_event::ScheduledEvent;
pub use simulator::Simulator;
pub use time::{SimTime, wait_duration, wake_time};
