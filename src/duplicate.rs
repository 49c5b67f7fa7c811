use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, warn};

use crate::fingerprint::{Fingerprint, HASH_BITS};

/// 持久层分配的提交编号
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubmissionId(pub i64);

impl fmt::Display for SubmissionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 窗口里的一条历史提交：(编号, 指纹)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub id: SubmissionId,
    pub fingerprint: Fingerprint,
}

impl Candidate {
    pub fn new(id: SubmissionId, fingerprint: Fingerprint) -> Self {
        Self { id, fingerprint }
    }
}

/// 命中的近似重复
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DuplicateMatch {
    pub submission_id: SubmissionId,
    pub distance: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DuplicateConfig {
    /// 汉明距离 <= 该值即视为近似重复 (含边界)
    pub max_distance: u32,
    /// 最多比较多少条历史指纹 (调用方按"最新在前"提供)
    pub window: usize,
}

impl Default for DuplicateConfig {
    fn default() -> Self {
        Self {
            max_distance: 10,
            window: 200,
        }
    }
}

/// 在有界窗口里找最接近的历史提交
///
/// 线性扫描 O(window)。距离 `<= max_distance` 才算命中；距离最小者胜出，距离相同取编号最小的。
///
/// 候选超过 `window` 条时只保留编号最大 (最新) 的 `window` 条，所以结果与候选顺序无关。
pub fn find_duplicate(
    fp: &Fingerprint,
    candidates: &[Candidate],
    config: &DuplicateConfig,
) -> Option<DuplicateMatch> {
    let mut scanned: Vec<&Candidate> = candidates.iter().collect();
    if scanned.len() > config.window {
        warn!(
            supplied = scanned.len(),
            window = config.window,
            "候选窗口超出上限，只比较最新的部分"
        );
        scanned.sort_unstable_by(|a, b| b.id.cmp(&a.id));
        scanned.truncate(config.window);
    }

    let best = scanned
        .into_iter()
        .map(|c| DuplicateMatch {
            submission_id: c.id,
            distance: c.fingerprint.distance(fp),
        })
        .min_by_key(|m| (m.distance, m.submission_id))?;

    debug!(
        nearest = %best.submission_id,
        distance = best.distance,
        bits = HASH_BITS,
        "最近邻"
    );

    (best.distance <= config.max_distance).then_some(best)
}
