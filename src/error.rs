//! 错误类型
//!
//! 配置/契约计划加载失败以 `Result` 返回；缓冲区契约违例说明路由策略有 bug。

use std::path::PathBuf;

use thiserror::Error;

use crate::net::MessageKey;

/// 缓冲区操作违反前置条件。
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BufferError {
    #[error("message {0:?} is already buffered")]
    AlreadyPresent(MessageKey),
    #[error("message {key:?} needs {size} bits but only {free} bits are free")]
    InsufficientSpace { key: MessageKey, size: u64, free: u64 },
    #[error("message {0:?} is not buffered")]
    NotPresent(MessageKey),
}

/// 契约计划不合法。
#[derive(Debug, Error, PartialEq)]
pub enum ContactPlanError {
    #[error("contact {tx}->{rx}: start_time has to be >= 0, got {start}")]
    NegativeStart { tx: usize, rx: usize, start: f64 },
    #[error("contact {tx}->{rx}: end_time {end} is before start_time {start}")]
    EndBeforeStart {
        tx: usize,
        rx: usize,
        start: f64,
        end: f64,
    },
    #[error("contact {tx}->{rx}: bit_rate may not be negative, got {bit_rate}")]
    NegativeBitRate { tx: usize, rx: usize, bit_rate: f64 },
    #[error("contact {tx}->{rx}: delay may not be negative, got {delay}")]
    NegativeDelay { tx: usize, rx: usize, delay: f64 },
    #[error("contact {tx}->{rx}: bit_error_rate {bit_error_rate} is outside [0, 1]")]
    InvalidBitErrorRate {
        tx: usize,
        rx: usize,
        bit_error_rate: f64,
    },
    #[error("contact {tx}->{rx}: probability {probability} is outside [0, 1]")]
    InvalidProbability {
        tx: usize,
        rx: usize,
        probability: f64,
    },
    #[error("contact {tx}->{rx}: {what} have to be provided in order")]
    Unordered {
        tx: usize,
        rx: usize,
        what: &'static str,
    },
    #[error("contact {tx}->{rx}: {what} cannot be empty")]
    Empty {
        tx: usize,
        rx: usize,
        what: &'static str,
    },
    #[error("contact {tx}->{rx}: no characteristics valid at {time}")]
    NoCharacteristics { tx: usize, rx: usize, time: f64 },
}

/// 链路模型参数不合法。
#[derive(Debug, Error, PartialEq)]
pub enum LinkModelError {
    #[error("bit_error_rate has to be within [0, 1], got {0}")]
    BitErrorRate(f64),
    #[error("{what} has to be finite and >= 0, got {value}")]
    Negative { what: &'static str, value: f64 },
}

/// 场景文件加载/校验错误。
#[derive(Debug, Error)]
pub enum ScenarioError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse scenario: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unsupported schema_version {0}")]
    SchemaVersion(u32),
    #[error("node {0} is referenced but not declared")]
    UnknownNode(usize),
    #[error("duplicate node id {0}")]
    DuplicateNode(usize),
    #[error(transparent)]
    ContactPlan(#[from] ContactPlanError),
    #[error(transparent)]
    LinkModel(#[from] LinkModelError),
    #[error("invalid scenario: {0}")]
    Invalid(String),
}
