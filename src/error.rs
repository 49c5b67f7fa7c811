use std::path::PathBuf;
use thiserror::Error;

/// 校验流水线的硬失败
///
/// 只有"图片读不了 / 解不开"会让整次校验中止，其余信号 (模型、EXIF) 都会降级成中性值。
#[derive(Debug, Error)]
pub enum VerifyError {
    /// 文件不存在或无权限
    #[error("cannot read image {}: {source}", path.display())]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// 文件能读，但不是可解码的图片
    #[error("cannot decode image {}: {source}", path.display())]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
}

impl VerifyError {
    /// 两种变体都对应"请重新上传一张有效图片"
    pub fn is_decode_failure(&self) -> bool {
        matches!(self, Self::Unreadable { .. } | Self::Decode { .. })
    }

    pub fn path(&self) -> &PathBuf {
        match self {
            Self::Unreadable { path, .. } | Self::Decode { path, .. } => path,
        }
    }
}

/// 启动时的配置错误，不会出现在单次请求里
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("{key}: cannot parse {value:?} as {expected}")]
    Invalid {
        key: &'static str,
        value: String,
        expected: &'static str,
    },

    #[error("{key}: {value} is outside {range}")]
    OutOfRange {
        key: &'static str,
        value: String,
        range: &'static str,
    },

    #[error("{key} must be set when {requires} is set")]
    Missing {
        key: &'static str,
        requires: &'static str,
    },
}

/// 模型不可用 (非致命)。调用方捕获后回退到启发式打分。
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("model artifact not found: {}", .0.display())]
    Missing(PathBuf),

    #[error("cannot read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid class map: {0}")]
    ClassMap(String),

    #[error("model backend error: {0}")]
    Backend(String),

    #[error("inference failed: {0}")]
    Inference(String),
}
