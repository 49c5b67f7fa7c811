//! 校验流水线 (Verification Pipeline)
//!
//! 一次提交进，一个 [`VerificationResult`] 出。除了调用方传入的候选窗口，调用之间没有任何共享可变状态。
//!
//! ```text
//! 图片路径 ─► 读字节 ─► 解码 ─┬─► 感知指纹 ─► 重复比对 ─┐
//!                             ├─► EXIF 时间检查 ─────────┼─► 决策 ─► VerificationResult
//!                             └─► 相关性打分 ────────────┘
//! ```

use chrono::{DateTime, Utc};
use image::DynamicImage;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::info;

use crate::config::Config;
use crate::duplicate::{self, DuplicateConfig};
use crate::error::VerifyError;
use crate::evidence::{VerificationInput, VerificationResult, SCHEMA_VERSION};
use crate::fingerprint;
use crate::heuristic::ScorerConfig;
use crate::metadata::{self, MetadataConfig};
use crate::policy::{self, PolicyConfig};
use crate::scorer::Scorer;

/// 流水线的全部只读配置
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub scorer: ScorerConfig,
    pub policy: PolicyConfig,
    pub duplicates: DuplicateConfig,
    pub metadata: MetadataConfig,
}

/// 校验器：配置 + 选定的打分后端，初始化后只读，可在多个线程间共享
#[derive(Debug)]
pub struct Verifier {
    config: PipelineConfig,
    scorer: Scorer,
}

impl Verifier {
    pub fn new(config: PipelineConfig, scorer: Scorer) -> Self {
        Self { config, scorer }
    }

    /// 按完整配置构建 (模型不可用时自动退回启发式)
    pub fn from_config(config: &Config) -> Self {
        Self::new(config.pipeline.clone(), Scorer::from_config(&config.model))
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// 当前打分后端的版本标签
    pub fn backend(&self) -> &str {
        self.scorer.version()
    }

    pub fn verify(&self, input: &VerificationInput) -> Result<VerificationResult, VerifyError> {
        self.verify_at(input, Utc::now())
    }

    /// 指定"当前时间"的校验 (EXIF 窗口以它为基准)
    pub fn verify_at(
        &self,
        input: &VerificationInput,
        now: DateTime<Utc>,
    ) -> Result<VerificationResult, VerifyError> {
        let (bytes, image) = load_image(&input.image_path)?;

        // 1. 身份：感知指纹 + 原始字节哈希
        let fingerprint = fingerprint::fingerprint(&image);
        let content_sha256 = fingerprint::content_digest(&bytes);

        // 2. 重复比对
        let duplicate = duplicate::find_duplicate(&fingerprint, &input.candidates, &self.config.duplicates);

        // 3. 拍摄时间
        let exif_time_ok = metadata::check_capture_time(&bytes, now, &self.config.metadata);

        // 4. 相关性 (模型优先，否则启发式)
        let relevance = self.scorer.score(&image, &input.report_type, &self.config.scorer);

        // 5. 决策
        let decision = policy::decide(&self.config.policy, relevance.relevance, duplicate.as_ref(), exif_time_ok);

        info!(
            path = %input.image_path.display(),
            report_type = %input.report_type,
            %fingerprint,
            duplicate_of = ?duplicate.map(|m| m.submission_id.0),
            ?exif_time_ok,
            relevance = relevance.relevance,
            action = decision.action_score,
            status = %decision.status,
            backend = %relevance.model_version,
            "校验完成"
        );

        Ok(VerificationResult {
            schema_version: SCHEMA_VERSION,
            label: decision.label,
            status: decision.status,
            fingerprint,
            content_sha256,
            duplicate_of: duplicate.map(|m| m.submission_id),
            duplicate_distance: duplicate.map(|m| m.distance),
            exif_time_ok,
            action_score: decision.action_score,
            auth_score: decision.auth_score,
            relevance_score: policy::clamp_unit(relevance.relevance),
            model_version: relevance.model_version,
            features: relevance.heuristic.features,
        })
    }
}

/// 读字节并按内容 (而不是扩展名) 解码
pub fn load_image(path: &Path) -> Result<(Vec<u8>, DynamicImage), VerifyError> {
    let bytes = fs::read(path).map_err(|source| VerifyError::Unreadable {
        path: path.to_path_buf(),
        source,
    })?;

    let image = image::load_from_memory(&bytes).map_err(|source| VerifyError::Decode {
        path: path.to_path_buf(),
        source,
    })?;

    Ok((bytes, image))
}

/// 上传允许的扩展名 (不区分大小写)
pub const ALLOWED_EXTENSIONS: [&str; 5] = ["png", "jpg", "jpeg", "webp", "bmp"];

pub fn is_allowed_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ALLOWED_EXTENSIONS.iter().any(|allowed| ext.eq_ignore_ascii_case(allowed)))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evidence::ReportType;

    #[test]
    fn extension_filter() {
        assert!(is_allowed_extension(Path::new("a/b/photo.JPG")));
        assert!(is_allowed_extension(Path::new("x.webp")));
        assert!(!is_allowed_extension(Path::new("x.gif")));
        assert!(!is_allowed_extension(Path::new("noext")));
    }

    #[test]
    fn missing_file_is_a_decode_failure() {
        let verifier = Verifier::new(PipelineConfig::default(), Scorer::HeuristicOnly);
        let input = VerificationInput::new("/no/such/file.png", ReportType::IllegalDumping, vec![]);
        let err = verifier.verify(&input).unwrap_err();
        assert!(matches!(err, VerifyError::Unreadable { .. }));
        assert!(err.is_decode_failure());
    }

    #[test]
    fn corrupt_file_is_a_decode_failure() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.png");
        fs::write(&path, b"\x89PNG\r\n\x1a\nthis is not a png body").unwrap();

        let verifier = Verifier::new(PipelineConfig::default(), Scorer::HeuristicOnly);
        let input = VerificationInput::new(&path, ReportType::IllegalDumping, vec![]);
        let err = verifier.verify(&input).unwrap_err();
        assert!(matches!(err, VerifyError::Decode { .. }));
        assert_eq!(err.path(), &path);
    }
}
