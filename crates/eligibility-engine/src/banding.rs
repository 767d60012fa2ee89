//! 结论分档
//!
//! 把评估结果映射为面向用户的结论。分档只是展示策略，与评估逻辑分离，可以替换。

use crate::models::AggregateResult;
use eligibility_shared::config::BandingConfig;
use serde::Serialize;
use std::fmt;

/// 结论
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Verdict {
    Excluded,
    LikelyToApprove,
    NeedsReview,
    LikelyToDeny,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Excluded => "EXCLUDED",
            Self::LikelyToApprove => "LIKELY_TO_APPROVE",
            Self::NeedsReview => "NEEDS_REVIEW",
            Self::LikelyToDeny => "LIKELY_TO_DENY",
        };
        write!(f, "{}", s)
    }
}

/// 就绪分数（0-100）
///
/// 被排除或没有计分规则时为 0。
pub fn readiness_score(result: &AggregateResult) -> u8 {
    if result.excluded || result.total_scoreable == 0 {
        return 0;
    }
    let score = result.rules_met * 100 / result.total_scoreable;
    u8::try_from(score).unwrap_or(100)
}

/// 结论策略
pub trait VerdictPolicy: Send + Sync {
    fn verdict(&self, result: &AggregateResult) -> Verdict;
}

/// 按分数与失败项数量分档
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThresholdBanding {
    pub approve_score: u8,
    pub deny_score: u8,
    pub deny_failures: usize,
}

impl ThresholdBanding {
    pub fn from_config(config: &BandingConfig) -> Self {
        Self {
            approve_score: config.approve_score,
            deny_score: config.deny_score,
            deny_failures: config.deny_failures,
        }
    }
}

impl Default for ThresholdBanding {
    fn default() -> Self {
        Self::from_config(&BandingConfig::default())
    }
}

impl VerdictPolicy for ThresholdBanding {
    fn verdict(&self, result: &AggregateResult) -> Verdict {
        if result.excluded {
            return Verdict::Excluded;
        }

        let score = readiness_score(result);
        if score >= self.approve_score && result.rules_failed == 0 {
            Verdict::LikelyToApprove
        } else if score < self.deny_score || result.rules_failed >= self.deny_failures {
            Verdict::LikelyToDeny
        } else {
            Verdict::NeedsReview
        }
    }
}
