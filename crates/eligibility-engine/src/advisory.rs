//! 提示性检查
//!
//! 在排除阶段通过后运行，只向结果追加警告，不影响规则是否满足或得分。

use crate::resolver::FactRecord;

/// 提示性检查接口
pub trait AdvisoryCheck: Send + Sync {
    /// 检查标识
    fn id(&self) -> &str;

    /// 返回一条警告，或 `None` 表示无需提示
    fn check(&self, record: &FactRecord) -> Option<String>;
}

/// 影像检查类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Modality {
    Mri,
    Ct,
}

impl Modality {
    /// 由 CPT 代码映射影像类型
    pub fn from_cpt(code: &str) -> Option<Self> {
        match code {
            "73721" | "73722" | "73723" => Some(Self::Mri),
            "73700" | "73701" => Some(Self::Ct),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mri => "MRI",
            Self::Ct => "CT",
        }
    }
}

/// 重复影像检查
///
/// 患者近期（不足 6 个月）已有同类影像时提示先复核已有检查。
#[derive(Debug, Clone)]
pub struct RepeatImagingCheck {
    requested: Option<Modality>,
    recent_months: f64,
}

impl RepeatImagingCheck {
    pub const ID: &'static str = "repeat_imaging_check";

    /// 近期影像的月数阈值
    pub const RECENT_MONTHS: f64 = 6.0;

    pub fn new(requested_code: &str) -> Self {
        Self {
            requested: Modality::from_cpt(requested_code),
            recent_months: Self::RECENT_MONTHS,
        }
    }
}

impl AdvisoryCheck for RepeatImagingCheck {
    fn id(&self) -> &str {
        Self::ID
    }

    fn check(&self, record: &FactRecord) -> Option<String> {
        let requested = self.requested?;
        let imaging = record.resolve("imaging_type");
        let imaging_type = imaging.as_text()?;
        let months = record.resolve("imaging_months_ago").as_number()?;

        if !imaging_type.eq_ignore_ascii_case(requested.as_str()) || months >= self.recent_months {
            return None;
        }

        let rounded = (months * 10.0).round() / 10.0;
        Some(format!(
            "Patient already has a recent {} from {} month(s) ago. \
             Review existing imaging before ordering a new study.",
            imaging_type, rounded
        ))
    }
}
