//! 事实记录与字段解析
//!
//! 事实记录由外部抽取组件生成，每次评估请求构建一次，之后不可变。
//! 字段路径使用点号分隔（如 "therapy.physical.weeks"），解析失败一律返回 `Value::Absent`。

use crate::error::{EngineError, Result};
use crate::value::Value;
use std::collections::BTreeMap;

/// 路径分隔符
pub const PATH_SEPARATOR: char = '.';

/// 事实树节点
#[derive(Debug, Clone, PartialEq)]
enum FactNode {
    Leaf(Value),
    Nested(BTreeMap<String, FactNode>),
    /// 无法映射到 `Value` 的值（如包含对象的列表），解析时视为缺失
    Untyped,
}

impl FactNode {
    fn from_json(json: &serde_json::Value) -> Self {
        match json {
            serde_json::Value::Object(map) => Self::Nested(
                map.iter()
                    .map(|(k, v)| (k.clone(), Self::from_json(v)))
                    .collect(),
            ),
            other => Value::from_json(other).map_or(Self::Untyped, Self::Leaf),
        }
    }
}

/// 事实记录
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FactRecord {
    fields: BTreeMap<String, FactNode>,
}

impl FactRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// 从 JSON 对象创建
    pub fn from_json(json: &serde_json::Value) -> Result<Self> {
        match FactNode::from_json(json) {
            FactNode::Nested(fields) => Ok(Self { fields }),
            _ => Err(EngineError::InvalidFactRecord(
                "事实记录必须是 JSON 对象".to_string(),
            )),
        }
    }

    /// 从 JSON 字符串创建
    pub fn from_json_str(json: &str) -> Result<Self> {
        let data: serde_json::Value = serde_json::from_str(json)?;
        Self::from_json(&data)
    }

    /// 设置字段值（构建阶段使用），路径中的中间层级会自动创建
    ///
    /// 若中间层级已是叶子值，会被替换为嵌套层级。
    pub fn with_field(mut self, path: &str, value: impl Into<Value>) -> Self {
        let segments: Vec<&str> = path.split(PATH_SEPARATOR).collect();
        insert_path(&mut self.fields, &segments, value.into());
        self
    }

    /// 解析字段路径
    pub fn resolve(&self, path: &str) -> Value {
        resolve(self, path)
    }

    /// 顶层字段数
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// 解析字段路径
///
/// 任一层级缺失、形状不符、终点为嵌套对象或无类型值时返回 `Absent`，从不报错。
/// 数字段可索引列表值，如 "diagnoses.0"。
pub fn resolve(record: &FactRecord, path: &str) -> Value {
    if path.is_empty() {
        return Value::Absent;
    }

    let mut segments = path.split(PATH_SEPARATOR);
    let Some(first) = segments.next() else {
        return Value::Absent;
    };

    let mut node = match record.fields.get(first) {
        Some(node) => node,
        None => return Value::Absent,
    };

    while let Some(segment) = segments.next() {
        match node {
            FactNode::Nested(children) => match children.get(segment) {
                Some(child) => node = child,
                None => return Value::Absent,
            },
            FactNode::Leaf(value) => {
                // 叶子值之后只允许列表索引
                return index_into(value, segment, segments);
            }
            FactNode::Untyped => return Value::Absent,
        }
    }

    match node {
        FactNode::Leaf(value) => value.clone(),
        FactNode::Nested(_) | FactNode::Untyped => Value::Absent,
    }
}

fn insert_path(fields: &mut BTreeMap<String, FactNode>, segments: &[&str], value: Value) {
    match segments {
        [] => {}
        [last] => {
            fields.insert(last.to_string(), FactNode::Leaf(value));
        }
        [head, rest @ ..] => {
            let node = fields
                .entry(head.to_string())
                .or_insert_with(|| FactNode::Nested(BTreeMap::new()));
            if let FactNode::Nested(children) = node {
                insert_path(children, rest, value);
            } else {
                let mut children = BTreeMap::new();
                insert_path(&mut children, rest, value);
                *node = FactNode::Nested(children);
            }
        }
    }
}

/// 在列表值中按索引继续解析
fn index_into<'a>(value: &Value, segment: &'a str, rest: impl Iterator<Item = &'a str>) -> Value {
    let mut current = value;
    for segment in std::iter::once(segment).chain(rest) {
        let Ok(index) = segment.parse::<usize>() else {
            return Value::Absent;
        };
        match current.as_list().and_then(|items| items.get(index)) {
            Some(item) => current = item,
            None => return Value::Absent,
        }
    }
    current.clone()
}
