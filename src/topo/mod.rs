//! 拓扑与契约计划
//!
//! 预测契约计划（PTVG）模型，以及常用拓扑的构建函数。

pub mod chain;
pub mod contact_plan;

pub use chain::{ChainOpts, build_chain};
pub use contact_plan::{
    Characteristics, FactualGeneration, FactualOptions, Generation, PredictedContact, Ptvg,
};
