//! 值模型
//!
//! 所有比较都基于封闭的 `Value` 类型进行，而不是直接比较 JSON，
//! 引擎因此与事实记录、规则文件的来源格式解耦。

use serde::{Deserialize, Serialize};
use std::fmt;

/// 事实值或规则目标值
///
/// `Absent` 表示“未观察到”，是一等值而不是错误。序列化时对应 JSON `null`。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Boolean(bool),
    Number(f64),
    Text(String),
    List(Vec<Value>),
    Absent,
}

impl Value {
    /// 从 JSON 转换
    ///
    /// 对象以及包含对象的列表没有对应的类型，返回 `None`。`null` 转为 `Absent`。
    pub fn from_json(json: &serde_json::Value) -> Option<Self> {
        match json {
            serde_json::Value::Null => Some(Self::Absent),
            serde_json::Value::Bool(b) => Some(Self::Boolean(*b)),
            serde_json::Value::Number(n) => n.as_f64().map(Self::Number),
            serde_json::Value::String(s) => Some(Self::Text(s.clone())),
            serde_json::Value::Array(items) => items
                .iter()
                .map(Self::from_json)
                .collect::<Option<Vec<_>>>()
                .map(Self::List),
            serde_json::Value::Object(_) => None,
        }
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, Self::Absent)
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// 获取值的类型名称
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Boolean(_) => "boolean",
            Self::Number(_) => "number",
            Self::Text(_) => "text",
            Self::List(_) => "list",
            Self::Absent => "absent",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Boolean(b) => write!(f, "{}", b),
            Self::Number(n) => write!(f, "{}", n),
            Self::Text(s) => write!(f, "{:?}", s),
            Self::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            Self::Absent => write!(f, "absent"),
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Number(value as f64)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Self::Number(f64::from(value))
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(values: Vec<T>) -> Self {
        Self::List(values.into_iter().map(Into::into).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_json_scalars() {
        assert_eq!(Value::from_json(&json!(true)), Some(Value::Boolean(true)));
        assert_eq!(Value::from_json(&json!(6)), Some(Value::Number(6.0)));
        assert_eq!(Value::from_json(&json!(2.5)), Some(Value::Number(2.5)));
        assert_eq!(Value::from_json(&json!("MRI")), Some(Value::from("MRI")));
        assert_eq!(Value::from_json(&json!(null)), Some(Value::Absent));
    }

    #[test]
    fn test_from_json_rejects_objects() {
        assert_eq!(Value::from_json(&json!({"a": 1})), None);
        assert_eq!(Value::from_json(&json!([1, {"a": 1}])), None);
    }

    #[test]
    fn test_integer_and_float_are_equal() {
        assert_eq!(Value::from_json(&json!(4)), Value::from_json(&json!(4.0)));
    }

    #[test]
    fn test_serialize_as_plain_json() {
        let value = Value::from(vec![Value::from("M17.11"), Value::Absent, Value::from(3)]);
        assert_eq!(serde_json::to_value(&value).unwrap(), json!(["M17.11", null, 3.0]));
    }

    #[test]
    fn test_display() {
        assert_eq!(Value::from(vec!["a", "b"]).to_string(), r#"["a", "b"]"#);
        assert_eq!(Value::Absent.to_string(), "absent");
        assert_eq!(Value::from(6).to_string(), "6");
    }
}
