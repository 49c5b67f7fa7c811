//! 随手拍举报的提交校验核心
//!
//! 一张上传的照片 -> 感知指纹、重复比对、EXIF 时间检查、相关性打分 -> `AUTO_OK` / `RECHECK`。

pub mod api;
pub mod config;
pub mod duplicate;
pub mod error;
pub mod evidence;
pub mod fingerprint;
pub mod heuristic;
pub mod ledger;
pub mod metadata;
pub mod model;
pub mod pipeline;
pub mod policy;
pub mod scorer;

pub use config::Config;
pub use duplicate::{find_duplicate, Candidate, DuplicateMatch, SubmissionId};
pub use error::{ConfigError, ModelError, VerifyError};
pub use evidence::{Label, ReportType, Status, VerificationInput, VerificationResult};
pub use fingerprint::{fingerprint, Fingerprint};
pub use heuristic::{score_relevance, ScorerConfig};
pub use pipeline::{PipelineConfig, Verifier};
pub use policy::{decide, PolicyConfig};
pub use scorer::Scorer;
