use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::operator::{CollectionOp, ComparisonOp, LogicalOp, TextOp};

/// 解析后的过滤表达式。节点是纯值：构建一次，之后不再修改。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FilterNode {
    /// `field:op:value`，比较/相等运算符
    Comparison {
        field: String,
        operator: ComparisonOp,
        value: Scalar,
    },
    /// `field:in:a,b,c`，值保持书写顺序
    Collection {
        field: String,
        operator: CollectionOp,
        values: Vec<Scalar>,
    },
    /// `field:between:start,end`，两端都包含
    Range {
        field: String,
        start: Scalar,
        end: Scalar,
    },
    TextSearch {
        field: String,
        operator: TextOp,
        pattern: String,
    },
    /// `and`/`or` 收集一次归约的左右两侧；`not` 包裹其操作数。
    Logical {
        operator: LogicalOp,
        operands: Vec<FilterNode>,
    },
}

/// 字面量。带引号的字符串和裸名称都成为 `Text`。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Text(String),
    Number(f64),
}

impl Scalar {
    pub fn text(s: impl Into<String>) -> Self {
        Scalar::Text(s.into())
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Text(s) => f.write_str(s),
            Scalar::Number(n) => write!(f, "{}", n),
        }
    }
}

impl From<&str> for Scalar {
    fn from(s: &str) -> Self {
        Scalar::Text(s.to_string())
    }
}

impl From<f64> for Scalar {
    fn from(n: f64) -> Self {
        Scalar::Number(n)
    }
}

impl FilterNode {
    pub fn comparison(field: &str, operator: ComparisonOp, value: impl Into<Scalar>) -> Self {
        FilterNode::Comparison {
            field: field.to_string(),
            operator,
            value: value.into(),
        }
    }

    pub fn collection(field: &str, operator: CollectionOp, values: Vec<Scalar>) -> Self {
        FilterNode::Collection {
            field: field.to_string(),
            operator,
            values,
        }
    }

    pub fn range(field: &str, start: impl Into<Scalar>, end: impl Into<Scalar>) -> Self {
        FilterNode::Range {
            field: field.to_string(),
            start: start.into(),
            end: end.into(),
        }
    }

    pub fn text_search(field: &str, operator: TextOp, pattern: &str) -> Self {
        FilterNode::TextSearch {
            field: field.to_string(),
            operator,
            pattern: pattern.to_string(),
        }
    }

    pub fn and(left: FilterNode, right: FilterNode) -> Self {
        FilterNode::Logical {
            operator: LogicalOp::And,
            operands: vec![left, right],
        }
    }

    pub fn or(left: FilterNode, right: FilterNode) -> Self {
        FilterNode::Logical {
            operator: LogicalOp::Or,
            operands: vec![left, right],
        }
    }

    pub fn not(operand: FilterNode) -> Self {
        FilterNode::Logical {
            operator: LogicalOp::Not,
            operands: vec![operand],
        }
    }

    /// 叶子节点检查的字段，逻辑节点返回 `None`。
    pub fn field(&self) -> Option<&str> {
        match self {
            FilterNode::Comparison { field, .. }
            | FilterNode::Collection { field, .. }
            | FilterNode::Range { field, .. }
            | FilterNode::TextSearch { field, .. } => Some(field.as_str()),
            FilterNode::Logical { .. } => None,
        }
    }

    /// 树中引用到的所有字段。
    pub fn fields(&self) -> BTreeSet<&str> {
        let mut fields = BTreeSet::new();
        let mut pending = vec![self];
        while let Some(node) = pending.pop() {
            match node {
                FilterNode::Logical { operands, .. } => pending.extend(operands),
                leaf => fields.extend(leaf.field()),
            }
        }
        fields
    }

    pub fn node_count(&self) -> usize {
        let mut count = 0;
        let mut pending = vec![self];
        while let Some(node) = pending.pop() {
            count += 1;
            if let FilterNode::Logical { operands, .. } = node {
                pending.extend(operands);
            }
        }
        count
    }
}
