//! 运算符族，以及对运算符关键字分类的注册表。
//!
//! 每个运算符都有唯一的小写规范名称，
//! 表层语法（`age:gte:18`）和节点序列化都使用这个名称。

use std::collections::{BTreeSet, HashMap};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{FilterError, Result};

/// 单值比较/相等运算符
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComparisonOp {
    Eq,
    Neq,
    Gt,
    Gte,
    Lt,
    Lte,
}

/// 集合成员运算符
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollectionOp {
    In,
    NotIn,
}

/// 两端都包含的区间
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RangeOp {
    Between,
}

/// 模式运算符。`ilike` 是不区分大小写的 `like`。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextOp {
    Like,
    Ilike,
    Contains,
}

/// 子谓词的组合运算符
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogicalOp {
    And,
    Or,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Family {
    Comparison,
    Collection,
    Range,
    Text,
    Logical,
}

/// 任意已注册的运算符，按族标记
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Comparison(ComparisonOp),
    Collection(CollectionOp),
    Range(RangeOp),
    Text(TextOp),
    Logical(LogicalOp),
}

impl ComparisonOp {
    pub const ALL: [ComparisonOp; 6] = [
        ComparisonOp::Eq,
        ComparisonOp::Neq,
        ComparisonOp::Gt,
        ComparisonOp::Gte,
        ComparisonOp::Lt,
        ComparisonOp::Lte,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ComparisonOp::Eq => "eq",
            ComparisonOp::Neq => "neq",
            ComparisonOp::Gt => "gt",
            ComparisonOp::Gte => "gte",
            ComparisonOp::Lt => "lt",
            ComparisonOp::Lte => "lte",
        }
    }
}

impl CollectionOp {
    pub const ALL: [CollectionOp; 2] = [CollectionOp::In, CollectionOp::NotIn];

    pub fn name(self) -> &'static str {
        match self {
            CollectionOp::In => "in",
            CollectionOp::NotIn => "not_in",
        }
    }
}

impl RangeOp {
    pub const ALL: [RangeOp; 1] = [RangeOp::Between];

    pub fn name(self) -> &'static str {
        "between"
    }
}

impl TextOp {
    pub const ALL: [TextOp; 3] = [TextOp::Like, TextOp::Ilike, TextOp::Contains];

    pub fn name(self) -> &'static str {
        match self {
            TextOp::Like => "like",
            TextOp::Ilike => "ilike",
            TextOp::Contains => "contains",
        }
    }
}

impl LogicalOp {
    pub const ALL: [LogicalOp; 3] = [LogicalOp::And, LogicalOp::Or, LogicalOp::Not];

    pub fn name(self) -> &'static str {
        match self {
            LogicalOp::And => "and",
            LogicalOp::Or => "or",
            LogicalOp::Not => "not",
        }
    }
}

impl Operator {
    pub fn family(self) -> Family {
        match self {
            Operator::Comparison(_) => Family::Comparison,
            Operator::Collection(_) => Family::Collection,
            Operator::Range(_) => Family::Range,
            Operator::Text(_) => Family::Text,
            Operator::Logical(_) => Family::Logical,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Operator::Comparison(op) => op.name(),
            Operator::Collection(op) => op.name(),
            Operator::Range(op) => op.name(),
            Operator::Text(op) => op.name(),
            Operator::Logical(op) => op.name(),
        }
    }

    fn all() -> impl Iterator<Item = Operator> {
        ComparisonOp::ALL
            .into_iter()
            .map(Operator::Comparison)
            .chain(CollectionOp::ALL.into_iter().map(Operator::Collection))
            .chain(RangeOp::ALL.into_iter().map(Operator::Range))
            .chain(TextOp::ALL.into_iter().map(Operator::Text))
            .chain(LogicalOp::ALL.into_iter().map(Operator::Logical))
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// 名称与运算符的双向查找。
///
/// 构建一次后传给需要对运算符关键字分类的地方；
/// 其中只有静态的运算符表。
#[derive(Debug, Clone)]
pub struct OperatorRegistry {
    by_name: HashMap<&'static str, Operator>,
}

impl Default for OperatorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl OperatorRegistry {
    pub fn new() -> Self {
        let by_name = Operator::all().map(|op| (op.name(), op)).collect();
        Self { by_name }
    }

    pub fn member_for(&self, name: &str) -> Result<Operator> {
        self.by_name
            .get(name)
            .copied()
            .ok_or_else(|| FilterError::UnknownOperator(name.to_string()))
    }

    pub fn name_for(&self, operator: Operator) -> &'static str {
        operator.name()
    }

    pub fn all_names(&self, family: Family) -> BTreeSet<&'static str> {
        self.by_name
            .iter()
            .filter(|(_, op)| op.family() == family)
            .map(|(name, _)| *name)
            .collect()
    }

    pub fn is_member(&self, name: &str, family: Family) -> bool {
        self.by_name
            .get(name)
            .is_some_and(|op| op.family() == family)
    }

    /// 比较表达式中 OPERATOR 位置可接受的关键字。
    /// 逻辑运算符是独立的语法关键字，不会出现在这里。
    pub fn is_field_operator(&self, name: &str) -> bool {
        self.by_name
            .get(name)
            .is_some_and(|op| op.family() != Family::Logical)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_round_trip() {
        let registry = OperatorRegistry::new();
        for op in Operator::all() {
            let name = registry.name_for(op);
            assert_eq!(registry.member_for(name).unwrap(), op);
        }
    }

    #[test]
    fn test_unknown_operator() {
        let registry = OperatorRegistry::new();
        assert_eq!(
            registry.member_for("approx"),
            Err(FilterError::UnknownOperator("approx".to_string()))
        );
        // 名称区分大小写
        assert!(registry.member_for("EQ").is_err());
    }

    #[test]
    fn test_names_are_unique_across_families() {
        let registry = OperatorRegistry::new();
        let families = [
            Family::Comparison,
            Family::Collection,
            Family::Range,
            Family::Text,
            Family::Logical,
        ];
        let total: usize = families.iter().map(|f| registry.all_names(*f).len()).sum();
        assert_eq!(total, Operator::all().count());
        assert_eq!(total, 15);
    }

    #[test]
    fn test_family_membership() {
        let registry = OperatorRegistry::new();
        assert_eq!(
            registry.all_names(Family::Text),
            BTreeSet::from(["contains", "ilike", "like"])
        );
        assert!(registry.is_member("not_in", Family::Collection));
        assert!(!registry.is_member("not_in", Family::Logical));
        assert!(registry.is_member("not", Family::Logical));
        assert!(registry.is_field_operator("between"));
        assert!(!registry.is_field_operator("and"));
    }

    #[test]
    fn test_serialized_names_match_surface_syntax() {
        assert_eq!(serde_json::to_string(&CollectionOp::NotIn).unwrap(), "\"not_in\"");
        assert_eq!(serde_json::to_string(&ComparisonOp::Gte).unwrap(), "\"gte\"");
        let op: TextOp = serde_json::from_str("\"ilike\"").unwrap();
        assert_eq!(op, TextOp::Ilike);
    }
}
