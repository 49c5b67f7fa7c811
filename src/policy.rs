//! 决策策略 (Decision Policy Engine)
//!
//! 把相关性、真实性、重复三路信号合成最终的 label / status。纯函数，任何输入都有结果。

use serde::{Deserialize, Serialize};

use crate::duplicate::DuplicateMatch;
use crate::evidence::{Label, Status};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// action 分数达到该值才可能自动通过
    pub action_cutoff: f64,
    /// 命中重复时从 action 分数里扣掉的量
    pub duplicate_penalty: f64,
    /// 运维开关：完全跳过重复扣分
    pub disable_duplicate_penalty: bool,
    /// 汉明距离 <= 该值的重复算"强匹配"，直接送人工
    pub strong_duplicate_distance: u32,
    /// EXIF 时间明确不合理时的真实性扣分
    pub exif_failure_penalty: f64,
    /// 命中重复时的真实性扣分
    pub duplicate_auth_penalty: f64,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            action_cutoff: 0.50,
            duplicate_penalty: 0.40,
            disable_duplicate_penalty: false,
            strong_duplicate_distance: 4,
            exif_failure_penalty: 0.5,
            duplicate_auth_penalty: 0.5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub label: Label,
    pub status: Status,
    pub action_score: f64,
    pub auth_score: f64,
}

/// 截断到 [0,1]；NaN 视为 0
pub fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// 真实性分数：EXIF 明确失败扣分，未知不扣；命中重复扣分
pub fn authenticity_score(
    config: &PolicyConfig,
    exif_time_ok: Option<bool>,
    duplicate: Option<&DuplicateMatch>,
) -> f64 {
    let mut score = 1.0;
    if exif_time_ok == Some(false) {
        score -= config.exif_failure_penalty;
    }
    if duplicate.is_some() {
        score -= config.duplicate_auth_penalty;
    }
    clamp_unit(score)
}

/// action 分数：相关性减去 (可关闭的) 重复扣分
pub fn action_score(config: &PolicyConfig, relevance: f64, duplicate: Option<&DuplicateMatch>) -> f64 {
    let mut score = clamp_unit(relevance);
    if duplicate.is_some() && !config.disable_duplicate_penalty {
        score -= config.duplicate_penalty;
    }
    clamp_unit(score)
}

/// 合成最终决策
///
/// AUTO_OK 需要同时满足：action >= cutoff、EXIF 没有明确失败、没有强重复匹配。
/// 其余一律 RECHECK。
pub fn decide(
    config: &PolicyConfig,
    relevance: f64,
    duplicate: Option<&DuplicateMatch>,
    exif_time_ok: Option<bool>,
) -> Decision {
    let action = action_score(config, relevance, duplicate);
    let auth = authenticity_score(config, exif_time_ok, duplicate);

    let strong_duplicate = duplicate.is_some_and(|m| m.distance <= config.strong_duplicate_distance);
    let exif_failed = exif_time_ok == Some(false);
    let red_flag = strong_duplicate || exif_failed;

    let status = if action >= config.action_cutoff && !red_flag {
        Status::AutoOk
    } else {
        Status::Recheck
    };

    // 标签按"哪一路信号主导了结果"给出
    let label = match status {
        Status::AutoOk => Label::LikelyValid,
        Status::Recheck if strong_duplicate => Label::LikelyDuplicate,
        Status::Recheck if exif_failed => Label::SuspectMetadata,
        Status::Recheck if duplicate.is_some() => Label::LikelyDuplicate,
        Status::Recheck => Label::NeedsReview,
    };

    Decision {
        label,
        status,
        action_score: action,
        auth_score: auth,
    }
}
