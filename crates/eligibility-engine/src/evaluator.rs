//! 条件评估器
//!
//! 实现各操作符的评估逻辑。字段缺失时任何操作符（包括 neq）都不满足；
//! 类型不匹配同样视为不满足，并返回一条不匹配说明，由上层写入 warnings。

use crate::models::Condition;
use crate::operators::Operator;
use crate::resolver::FactRecord;
use crate::value::Value;
use std::fmt;

/// 类型不匹配说明
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeMismatch {
    pub operator: Operator,
    pub expected: &'static str,
    pub actual: &'static str,
    /// 不匹配发生在哪一侧
    pub side: Side,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Fact,
    Target,
}

impl fmt::Display for TypeMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let side = match self.side {
            Side::Fact => "fact value",
            Side::Target => "rule target",
        };
        write!(
            f,
            "operator '{}' expects {} {} but found {}",
            self.operator, side, self.expected, self.actual
        )
    }
}

/// 单个条件的评估结果
#[derive(Debug, Clone, PartialEq)]
pub struct ConditionOutcome {
    pub met: bool,
    pub resolved: Value,
    pub mismatch: Option<TypeMismatch>,
}

/// 比较结果
type Comparison = Result<bool, TypeMismatch>;

/// 条件评估器
pub struct ConditionEvaluator;

impl ConditionEvaluator {
    /// 针对事实记录评估条件
    pub fn evaluate(record: &FactRecord, condition: &Condition) -> ConditionOutcome {
        let resolved = record.resolve(&condition.field);
        let (met, mismatch) = match Self::compare(&resolved, condition.operator, &condition.target)
        {
            Ok(met) => (met, None),
            Err(mismatch) => (false, Some(mismatch)),
        };

        ConditionOutcome {
            met,
            resolved,
            mismatch,
        }
    }

    /// 比较已解析的值与目标值
    ///
    /// # Arguments
    /// * `resolved` - 从事实记录中解析出的值
    /// * `operator` - 操作符
    /// * `target` - 规则中定义的目标值
    pub fn compare(resolved: &Value, operator: Operator, target: &Value) -> Comparison {
        // 缺失的事实不能满足任何条件，也不是类型错误
        if resolved.is_absent() {
            return Ok(false);
        }

        match operator {
            Operator::Eq => Ok(resolved == target),
            Operator::Neq => Ok(resolved != target),
            Operator::Gt => Self::numeric(resolved, operator, target, |a, b| a > b),
            Operator::Gte => Self::numeric(resolved, operator, target, |a, b| a >= b),
            Operator::Lt => Self::numeric(resolved, operator, target, |a, b| a < b),
            Operator::Lte => Self::numeric(resolved, operator, target, |a, b| a <= b),
            Operator::In => Self::in_list(resolved, operator, target),
            Operator::NotIn => Self::in_list(resolved, operator, target).map(|r| !r),
            Operator::Contains => Self::contains(resolved, operator, target),
            Operator::AnyIn => Self::any_in(resolved, operator, target),
        }
    }

    /// 数值比较
    fn numeric<F>(resolved: &Value, operator: Operator, target: &Value, cmp: F) -> Comparison
    where
        F: Fn(f64, f64) -> bool,
    {
        let fact = resolved
            .as_number()
            .ok_or_else(|| Self::mismatch(operator, "number", resolved, Side::Fact))?;
        let expected = target
            .as_number()
            .ok_or_else(|| Self::mismatch(operator, "number", target, Side::Target))?;

        Ok(cmp(fact, expected))
    }

    /// 列表成员检查 (in)
    fn in_list(resolved: &Value, operator: Operator, target: &Value) -> Comparison {
        let items = target
            .as_list()
            .ok_or_else(|| Self::mismatch(operator, "list", target, Side::Target))?;

        Ok(items.contains(resolved))
    }

    /// 事实列表包含目标值 (contains)
    fn contains(resolved: &Value, operator: Operator, target: &Value) -> Comparison {
        let items = resolved
            .as_list()
            .ok_or_else(|| Self::mismatch(operator, "list", resolved, Side::Fact))?;

        Ok(items.contains(target))
    }

    /// 两个列表存在交集 (any_in)
    fn any_in(resolved: &Value, operator: Operator, target: &Value) -> Comparison {
        let facts = resolved
            .as_list()
            .ok_or_else(|| Self::mismatch(operator, "list", resolved, Side::Fact))?;
        let expected = target
            .as_list()
            .ok_or_else(|| Self::mismatch(operator, "list", target, Side::Target))?;

        Ok(facts.iter().any(|item| expected.contains(item)))
    }

    fn mismatch(operator: Operator, expected: &'static str, actual: &Value, side: Side) -> TypeMismatch {
        TypeMismatch {
            operator,
            expected,
            actual: actual.type_name(),
            side,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compare(resolved: impl Into<Value>, operator: Operator, target: impl Into<Value>) -> Comparison {
        ConditionEvaluator::compare(&resolved.into(), operator, &target.into())
    }

    #[test]
    fn test_eq_and_neq() {
        assert!(compare(true, Operator::Eq, true).unwrap());
        assert!(!compare(true, Operator::Eq, false).unwrap());
        assert!(compare("MRI", Operator::Eq, "MRI").unwrap());
        assert!(!compare("MRI", Operator::Eq, "mri").unwrap());
        assert!(compare(4, Operator::Eq, 4.0).unwrap());
        assert!(compare("MRI", Operator::Neq, "CT").unwrap());
        // 不同类型结构上不相等，不是类型错误
        assert!(!compare("6", Operator::Eq, 6).unwrap());
        assert!(compare("6", Operator::Neq, 6).unwrap());
    }

    #[test]
    fn test_numeric_comparisons() {
        assert!(compare(8, Operator::Gt, 6).unwrap());
        assert!(compare(6, Operator::Gte, 6).unwrap());
        assert!(compare(4, Operator::Lt, 6).unwrap());
        assert!(compare(60, Operator::Lte, 60).unwrap());
        assert!(!compare(61, Operator::Lte, 60).unwrap());
    }

    #[test]
    fn test_numeric_type_mismatch() {
        let err = compare("eight", Operator::Gte, 6).unwrap_err();
        assert_eq!(err.side, Side::Fact);
        assert_eq!(err.actual, "text");
        assert_eq!(err.expected, "number");

        let err = compare(8, Operator::Gt, "six").unwrap_err();
        assert_eq!(err.side, Side::Target);
        assert!(err.to_string().contains("rule target number"));
    }

    #[test]
    fn test_in_and_not_in() {
        let codes = vec!["M17.11", "M23.2"];
        assert!(compare("M17.11", Operator::In, codes.clone()).unwrap());
        assert!(!compare("S83.2", Operator::In, codes.clone()).unwrap());
        assert!(compare("S83.2", Operator::NotIn, codes.clone()).unwrap());
        assert!(!compare("M23.2", Operator::NotIn, codes).unwrap());
        assert!(compare("x", Operator::NotIn, "x").is_err());
    }

    #[test]
    fn test_contains() {
        let facts = vec!["swelling", "locking"];
        assert!(compare(facts.clone(), Operator::Contains, "locking").unwrap());
        assert!(!compare(facts, Operator::Contains, "instability").unwrap());
        assert!(compare("swelling", Operator::Contains, "swell").is_err());
    }

    #[test]
    fn test_any_in() {
        assert!(compare(vec!["a", "b"], Operator::AnyIn, vec!["b", "c"]).unwrap());
        assert!(!compare(vec!["a", "b"], Operator::AnyIn, vec!["x", "y"]).unwrap());
        assert!(!compare(Vec::<Value>::new(), Operator::AnyIn, vec!["x"]).unwrap());
        assert!(compare("a", Operator::AnyIn, vec!["a"]).is_err());
    }

    #[test]
    fn test_absent_never_met_and_never_mismatch() {
        for operator in Operator::ALL {
            for target in [Value::from(6), Value::from(false), Value::from(vec!["a"]), Value::Absent] {
                assert_eq!(
                    ConditionEvaluator::compare(&Value::Absent, operator, &target),
                    Ok(false),
                    "{} against {:?}",
                    operator,
                    target
                );
            }
        }
    }

    #[test]
    fn test_evaluate_against_record() {
        let record = FactRecord::new().with_field("pt_weeks", 8).with_field("note", "text");

        let outcome = ConditionEvaluator::evaluate(&record, &Condition::new("pt_weeks", Operator::Gte, 6));
        assert!(outcome.met);
        assert_eq!(outcome.resolved, Value::Number(8.0));
        assert!(outcome.mismatch.is_none());

        let outcome = ConditionEvaluator::evaluate(&record, &Condition::new("note", Operator::Gt, 1));
        assert!(!outcome.met);
        assert!(outcome.mismatch.is_some());

        let outcome =
            ConditionEvaluator::evaluate(&record, &Condition::new("imaging_days_ago", Operator::Lte, 60));
        assert!(!outcome.met);
        assert_eq!(outcome.resolved, Value::Absent);
        assert!(outcome.mismatch.is_none());
    }
}
