use image::DynamicImage;
use tracing::warn;

use crate::evidence::ReportType;
use crate::heuristic::{self, HeuristicScore, ScorerConfig};
use crate::model::{ModelConfig, ModelScorer};
use crate::policy::clamp_unit;

/// 启发式后端的版本标签
pub const HEURISTIC_VERSION: &str = "heuristic-v1";

/// 相关性打分后端，初始化时选定一次
///
/// 调用方不需要关心模型是否存在：`HeuristicOnly` 本身就是合法配置。
#[derive(Debug)]
pub enum Scorer {
    ModelBacked { model: ModelScorer, blend: f64 },
    HeuristicOnly,
}

/// 一次打分的全部产出
#[derive(Debug, Clone, PartialEq)]
pub struct RelevanceOutcome {
    pub relevance: f64,
    pub heuristic: HeuristicScore,
    /// 模型给出的原始分数 (没有模型或推理失败时为 None)
    pub model_score: Option<f64>,
    pub model_version: String,
}

impl Scorer {
    /// 按配置选择后端。模型缺失 / 损坏时记录警告并退回启发式。
    pub fn from_config(config: &ModelConfig) -> Self {
        if config.model_path.is_none() {
            return Self::HeuristicOnly;
        }

        match ModelScorer::load(config) {
            Ok(model) => Self::ModelBacked {
                model,
                blend: clamp_unit(config.blend),
            },
            Err(err) => {
                warn!(error = %err, "模型不可用，回退到启发式打分");
                Self::HeuristicOnly
            }
        }
    }

    /// 当前后端的版本标签
    pub fn version(&self) -> &str {
        match self {
            Self::ModelBacked { model, .. } => model.version(),
            Self::HeuristicOnly => HEURISTIC_VERSION,
        }
    }

    /// 只跑模型；没有模型或推理失败都返回 None
    pub fn score_with_model(&self, image: &DynamicImage) -> Option<f64> {
        let Self::ModelBacked { model, .. } = self else {
            return None;
        };

        match model.score(image) {
            Ok(score) => Some(clamp_unit(score)),
            Err(err) => {
                warn!(error = %err, version = model.version(), "模型推理失败，本次使用启发式分数");
                None
            }
        }
    }

    /// 启发式总是计算 (特征明细要随结果保存)，模型可用时按 blend 覆盖/混合
    pub fn score(&self, image: &DynamicImage, report_type: &ReportType, config: &ScorerConfig) -> RelevanceOutcome {
        let heuristic = heuristic::score_with_features(image, report_type, config);

        let (relevance, model_score, model_version) = match (self, self.score_with_model(image)) {
            (Self::ModelBacked { model, blend }, Some(p)) => (
                clamp_unit(blend * p + (1.0 - blend) * heuristic.score),
                Some(p),
                model.version().to_string(),
            ),
            _ => (heuristic.score, None, HEURISTIC_VERSION.to_string()),
        };

        RelevanceOutcome {
            relevance,
            heuristic,
            model_score,
            model_version,
        }
    }
}
