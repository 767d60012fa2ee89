//! 规则操作符定义

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 条件操作符
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    // 通用比较
    Eq,
    Neq,

    // 数值比较
    Gt,
    Gte,
    Lt,
    Lte,

    // 包含检查
    In,
    NotIn,
    Contains,
    AnyIn,
}

impl Operator {
    pub const ALL: [Operator; 10] = [
        Self::Eq,
        Self::Neq,
        Self::Gt,
        Self::Gte,
        Self::Lt,
        Self::Lte,
        Self::In,
        Self::NotIn,
        Self::Contains,
        Self::AnyIn,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Eq => "eq",
            Self::Neq => "neq",
            Self::Gt => "gt",
            Self::Gte => "gte",
            Self::Lt => "lt",
            Self::Lte => "lte",
            Self::In => "in",
            Self::NotIn => "not_in",
            Self::Contains => "contains",
            Self::AnyIn => "any_in",
        }
    }

    /// 是否为数值比较操作符
    pub fn is_numeric(&self) -> bool {
        matches!(self, Self::Gt | Self::Gte | Self::Lt | Self::Lte)
    }

    /// 目标值是否必须为列表
    pub fn requires_list_target(&self) -> bool {
        matches!(self, Self::In | Self::NotIn | Self::AnyIn)
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Operator {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|op| op.as_str() == s)
            .ok_or_else(|| format!("未知的操作符: '{}'", s))
    }
}

/// 逻辑操作符：规则内各条件的聚合方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Logic {
    All,
    Any,
    CountAtLeast { threshold: usize },
    CountAtMost { threshold: usize },
}

impl Logic {
    /// 按逻辑操作符聚合条件结果
    ///
    /// `met_count` 为满足的条件数，`total` 为条件总数。
    pub fn aggregate(&self, met_count: usize, total: usize) -> bool {
        match self {
            Self::All => met_count == total,
            Self::Any => met_count > 0,
            Self::CountAtLeast { threshold } => met_count >= *threshold,
            Self::CountAtMost { threshold } => met_count <= *threshold,
        }
    }

    pub fn threshold(&self) -> Option<usize> {
        match self {
            Self::CountAtLeast { threshold } | Self::CountAtMost { threshold } => Some(*threshold),
            Self::All | Self::Any => None,
        }
    }
}

impl fmt::Display for Logic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => write!(f, "ALL"),
            Self::Any => write!(f, "ANY"),
            Self::CountAtLeast { threshold } => write!(f, "COUNT>={}", threshold),
            Self::CountAtMost { threshold } => write!(f, "COUNT<={}", threshold),
        }
    }
}

/// 规则文件中的逻辑名称（不含阈值）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicKind {
    All,
    Any,
    CountAtLeast,
    CountAtMost,
}

impl LogicKind {
    pub fn is_count(&self) -> bool {
        matches!(self, Self::CountAtLeast | Self::CountAtMost)
    }
}

impl FromStr for LogicKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "all" => Ok(Self::All),
            "any" => Ok(Self::Any),
            "count_gte" | "count_at_least" => Ok(Self::CountAtLeast),
            "count_lte" | "count_at_most" => Ok(Self::CountAtMost),
            other => Err(format!("未知的逻辑操作符: '{}'", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operator_round_trip_names() {
        for op in Operator::ALL {
            assert_eq!(op.as_str().parse::<Operator>().unwrap(), op);
            let json = serde_json::to_string(&op).unwrap();
            assert_eq!(json, format!("\"{}\"", op.as_str()));
        }
    }

    #[test]
    fn test_unknown_operator() {
        let err = "between".parse::<Operator>().unwrap_err();
        assert!(err.contains("between"));
        assert!("EQ".parse::<Operator>().is_err());
    }

    #[test]
    fn test_logic_aggregate() {
        assert!(Logic::All.aggregate(3, 3));
        assert!(!Logic::All.aggregate(2, 3));
        assert!(Logic::Any.aggregate(1, 3));
        assert!(!Logic::Any.aggregate(0, 3));
        assert!(Logic::CountAtLeast { threshold: 2 }.aggregate(2, 5));
        assert!(!Logic::CountAtLeast { threshold: 2 }.aggregate(1, 5));
        assert!(Logic::CountAtMost { threshold: 1 }.aggregate(1, 4));
        assert!(!Logic::CountAtMost { threshold: 1 }.aggregate(2, 4));
    }

    #[test]
    fn test_logic_kind_aliases() {
        assert_eq!("count_gte".parse::<LogicKind>().unwrap(), LogicKind::CountAtLeast);
        assert_eq!("count_at_most".parse::<LogicKind>().unwrap(), LogicKind::CountAtMost);
        assert!("majority".parse::<LogicKind>().is_err());
    }

    #[test]
    fn test_logic_serialization() {
        let json = serde_json::to_value(Logic::CountAtLeast { threshold: 2 }).unwrap();
        assert_eq!(json, serde_json::json!({"type": "count_at_least", "threshold": 2}));
    }
}
