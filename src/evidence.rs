use serde::{Deserialize, Serialize}; // 引入序列化库，让结构体能转成JSON传输
use std::fmt;
use std::path::PathBuf;

use crate::duplicate::{Candidate, SubmissionId};
use crate::fingerprint::Fingerprint;
use crate::heuristic::FeatureVector;

/// 结果结构的版本号。字段含义有任何变化都要 +1，旧消费者只读 label / status / action_score。
pub const SCHEMA_VERSION: u32 = 1;

/// 举报类型
///
/// 目前只有 `illegal_dumping` 有专门的打分奖励，其余类型原样保留字符串。
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ReportType {
    IllegalDumping,
    Other(String),
}

impl ReportType {
    pub const ILLEGAL_DUMPING: &'static str = "illegal_dumping";

    pub fn is_illegal_dumping(&self) -> bool {
        matches!(self, Self::IllegalDumping)
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::IllegalDumping => Self::ILLEGAL_DUMPING,
            Self::Other(tag) => tag,
        }
    }
}

impl Default for ReportType {
    fn default() -> Self {
        Self::IllegalDumping
    }
}

impl From<&str> for ReportType {
    fn from(tag: &str) -> Self {
        let tag = tag.trim();
        if tag.eq_ignore_ascii_case(Self::ILLEGAL_DUMPING) {
            Self::IllegalDumping
        } else {
            Self::Other(tag.to_string())
        }
    }
}

impl From<String> for ReportType {
    fn from(tag: String) -> Self {
        Self::from(tag.as_str())
    }
}

impl From<ReportType> for String {
    fn from(report_type: ReportType) -> Self {
        report_type.as_str().to_string()
    }
}

impl fmt::Display for ReportType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 审核路由的终态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    /// 自动通过
    AutoOk,
    /// 需要人工复核 (保守默认值)
    Recheck,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::AutoOk => "AUTO_OK",
            Self::Recheck => "RECHECK",
        })
    }
}

/// 决策的简短分类标签，只用于审计展示
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Label {
    LikelyValid,
    LikelyDuplicate,
    SuspectMetadata,
    NeedsReview,
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::LikelyValid => "likely-valid",
            Self::LikelyDuplicate => "likely-duplicate",
            Self::SuspectMetadata => "suspect-metadata",
            Self::NeedsReview => "needs-review",
        })
    }
}

/// 一次校验的输入 (不可变)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationInput {
    /// 上传处理器保存好的图片路径
    pub image_path: PathBuf,
    pub report_type: ReportType,
    /// 最近的历史指纹 (最新在前)，比较与顺序无关
    pub candidates: Vec<Candidate>,
}

impl VerificationInput {
    pub fn new(image_path: impl Into<PathBuf>, report_type: ReportType, candidates: Vec<Candidate>) -> Self {
        Self {
            image_path: image_path.into(),
            report_type,
            candidates,
        }
    }
}

/// 校验结果 (流水线唯一的输出)
///
/// 计算一次后不再修改；管理员改状态属于外部持久层的事。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationResult {
    pub schema_version: u32,

    pub label: Label,
    pub status: Status,

    // === 身份层 ===
    pub fingerprint: Fingerprint,
    /// 上传原始字节的 SHA256
    pub content_sha256: String,
    /// 近似重复的历史提交 (仅供参考，不隐含级联关系)
    pub duplicate_of: Option<SubmissionId>,
    pub duplicate_distance: Option<u32>,

    // === 真实性 ===
    /// None = 没有可用的拍摄时间元数据
    pub exif_time_ok: Option<bool>,

    // === 分数 (全部在 [0,1]) ===
    pub action_score: f64,
    pub auth_score: f64,
    pub relevance_score: f64,

    /// 产生 relevance / action 分数的后端
    pub model_version: String,
    pub features: FeatureVector,
}
