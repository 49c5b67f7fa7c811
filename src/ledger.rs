use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use crate::duplicate::{Candidate, SubmissionId};
use crate::evidence::{ReportType, VerificationResult};

/// 台账里的一条提交
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionRecord {
    pub id: SubmissionId,
    pub report_type: ReportType,
    pub image_path: String,
    pub result: VerificationResult,
}

/// 提交台账 (Submission Ledger)
///
/// **职责**: 服务进程内的"最近提交"记录，给重复比对提供候选窗口。
/// 只追加，按编号递增；超过容量时淘汰最旧的记录。
///
/// **[⚠️ 生产风险]**: 纯内存实现，进程一关记录全部丢失。正式部署时这部分由外部持久层负责。
#[derive(Debug)]
pub struct SubmissionLedger {
    records: VecDeque<SubmissionRecord>,
    next_id: i64,
    capacity: usize,
}

impl SubmissionLedger {
    pub fn new(capacity: usize) -> Self {
        Self {
            records: VecDeque::new(),
            next_id: 1,
            capacity: capacity.max(1),
        }
    }

    /// 追加一条记录，返回分配的编号
    pub fn append(&mut self, report_type: ReportType, image_path: String, result: VerificationResult) -> SubmissionId {
        let id = SubmissionId(self.next_id);
        self.next_id += 1;

        if self.records.len() == self.capacity {
            self.records.pop_front();
        }
        self.records.push_back(SubmissionRecord {
            id,
            report_type,
            image_path,
            result,
        });
        id
    }

    /// 最近 `window` 条的 (编号, 指纹)，最新在前
    pub fn recent_candidates(&self, window: usize) -> Vec<Candidate> {
        self.records
            .iter()
            .rev()
            .take(window)
            .map(|r| Candidate::new(r.id, r.result.fingerprint.clone()))
            .collect()
    }

    pub fn get(&self, id: SubmissionId) -> Option<&SubmissionRecord> {
        self.records
            .binary_search_by_key(&id, |r| r.id)
            .ok()
            .map(|idx| &self.records[idx])
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
