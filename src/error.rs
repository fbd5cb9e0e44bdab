//! 统一错误类型定义
//!
//! 使用 `thiserror` 简化错误类型定义。
//! `AppError` 表示会中止整次运行的错误（目录读不了、产物写不了、配置非法、模型加载失败），
//! `ItemError` 表示只影响单个条目的错误，流水线记录日志后继续处理下一条。

use thiserror::Error;

use crate::services::FetchError;

/// 运行级统一错误类型
#[derive(Debug, Error)]
pub enum AppError {
    /// 文件操作错误
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON 序列化/反序列化错误
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// 目录文档结构不符合预期（缺少 `items` 数组等）
    #[error("catalog error: {0}")]
    Catalog(String),

    /// 配置错误
    #[error("config error: {0}")]
    Config(String),

    /// 视觉模型加载失败或整体不可用
    #[error("model error: {0}")]
    Model(String),
}

// 注意: String 错误不直接转换为 AppError，
// 需经 ResultExt 指明类别（config_err / model_err / catalog_err）后再用 ? 返回。

/// 运行级 Result 类型别名
pub type AppResult<T> = Result<T, AppError>;

/// 条目级错误，均不会中止整次运行
///
/// `kind()` 返回稳定的机器可读标识，用于日志字段和运行汇总。
#[derive(Debug, Error)]
pub enum ItemError {
    /// manifest 的所有回退规则都没有解析出图片地址
    #[error("no image url could be resolved from manifest {manifest_uri}")]
    ManifestUnresolvable { manifest_uri: String },

    /// 网络错误、超时或非 2xx 状态码
    #[error("fetch failed for {uri}: {source}")]
    TransportFailure {
        uri: String,
        #[source]
        source: FetchError,
    },

    /// 响应内容无法解码为图片（或被模型拒绝）
    #[error("could not decode image from {uri}: {reason}")]
    DecodeFailure { uri: String, reason: String },

    /// 缓存的向量无法读取，调用方按未命中处理
    #[error("cache entry for {key} is unreadable: {reason}")]
    CacheCorrupt { key: String, reason: String },

    /// 条目缺少处理所需的字段
    #[error("item is missing field `{field}`")]
    MissingField { field: &'static str },
}

impl ItemError {
    pub fn kind(&self) -> &'static str {
        match self {
            ItemError::ManifestUnresolvable { .. } => "manifest_unresolvable",
            ItemError::TransportFailure { .. } => "transport_failure",
            ItemError::DecodeFailure { .. } => "decode_failure",
            ItemError::CacheCorrupt { .. } => "cache_corrupt",
            ItemError::MissingField { .. } => "missing_field",
        }
    }
}

// ========== 扩展 trait：为 Result 添加上下文 ==========

/// 为 `Result` 提供带上下文的错误转换
///
/// 任何实现了 `Display` 的错误都可以用，消息格式为 `"{上下文}: {原始错误}"`。
pub trait ResultExt<T> {
    /// 转换为配置错误
    fn config_err(self, msg: &str) -> AppResult<T>;

    /// 转换为模型错误
    fn model_err(self, msg: &str) -> AppResult<T>;

    /// 转换为目录错误
    fn catalog_err(self, msg: &str) -> AppResult<T>;
}

impl<T, E: std::fmt::Display> ResultExt<T> for Result<T, E> {
    fn config_err(self, msg: &str) -> AppResult<T> {
        self.map_err(|e| AppError::Config(format!("{}: {}", msg, e)))
    }

    fn model_err(self, msg: &str) -> AppResult<T> {
        self.map_err(|e| AppError::Model(format!("{}: {}", msg, e)))
    }

    fn catalog_err(self, msg: &str) -> AppResult<T> {
        self.map_err(|e| AppError::Catalog(format!("{}: {}", msg, e)))
    }
}
