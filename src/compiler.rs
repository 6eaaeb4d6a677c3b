//! 谓词编译器：把 [`FilterNode`] 树编译成由调用方提供的
//! [`QueryableModel`] 构建的谓词。
//!
//! | 节点                 | 谓词                                        |
//! |----------------------|---------------------------------------------|
//! | Comparison           | `field <op> value`                          |
//! | Collection           | `field IN (...)` / `field NOT IN (...)`     |
//! | Range                | `field BETWEEN start AND end`（闭区间）     |
//! | TextSearch like      | 区分大小写的模式                            |
//! | TextSearch ilike     | 不区分大小写的模式                          |
//! | TextSearch contains  | 区分大小写的模式 `%text%`                   |
//! | Logical and / or     | 操作数的合取 / 析取                         |
//! | Logical not          | 操作数合取的否定                            |
//!
//! 只有一个操作数的逻辑节点直接编译为该操作数（`not` 则取反）。
//! 没有操作数的逻辑节点会被拒绝。

use tracing::trace;

use crate::ast::{FilterNode, Scalar};
use crate::error::{FilterError, Result};
use crate::operator::{CollectionOp, ComparisonOp, LogicalOp, TextOp};

/// 编译器对数据模型的要求：按名称查找字段，以及构建谓词。
/// 实现方永远不会收到原始查询文本，只会收到字段和字面量。
pub trait QueryableModel {
    /// 解析后的字段引用。
    type Field;
    type Predicate;

    /// 模型没有该字段时返回 [`FilterError::UnknownField`]。
    fn field_accessor(&self, name: &str) -> Result<Self::Field>;

    fn compare(&self, field: &Self::Field, op: ComparisonOp, value: &Scalar) -> Result<Self::Predicate>;

    fn member_of(&self, field: &Self::Field, op: CollectionOp, values: &[Scalar]) -> Result<Self::Predicate>;

    /// 两端都包含；边界保持书写顺序。
    fn between(&self, field: &Self::Field, start: &Scalar, end: &Scalar) -> Result<Self::Predicate>;

    /// `pattern` 使用 SQL 通配符：`%` 匹配任意长度字符，`_` 匹配恰好一个字符。
    fn like(&self, field: &Self::Field, pattern: &str, case_insensitive: bool) -> Result<Self::Predicate>;

    /// 调用时至少有两个谓词。
    fn all(&self, predicates: Vec<Self::Predicate>) -> Self::Predicate;

    /// 调用时至少有两个谓词。
    fn any(&self, predicates: Vec<Self::Predicate>) -> Self::Predicate;

    fn negate(&self, predicate: Self::Predicate) -> Self::Predicate;
}

/// 无状态；一个实例可以在任意线程编译任意多棵树。
#[derive(Debug, Clone, Copy, Default)]
pub struct PredicateCompiler;

impl PredicateCompiler {
    pub fn new() -> Self {
        PredicateCompiler
    }

    pub fn compile<M: QueryableModel>(&self, node: &FilterNode, model: &M) -> Result<M::Predicate> {
        match node {
            FilterNode::Comparison {
                field,
                operator,
                value,
            } => {
                trace!(field = field.as_str(), operator = operator.name(), "compiling comparison");
                let column = model.field_accessor(field)?;
                model.compare(&column, *operator, value)
            }
            FilterNode::Collection {
                field,
                operator,
                values,
            } => {
                trace!(field = field.as_str(), operator = operator.name(), count = values.len(), "compiling collection");
                let column = model.field_accessor(field)?;
                model.member_of(&column, *operator, values)
            }
            FilterNode::Range { field, start, end } => {
                trace!(field = field.as_str(), "compiling range");
                let column = model.field_accessor(field)?;
                model.between(&column, start, end)
            }
            FilterNode::TextSearch {
                field,
                operator,
                pattern,
            } => {
                trace!(field = field.as_str(), operator = operator.name(), "compiling text search");
                let column = model.field_accessor(field)?;
                match operator {
                    TextOp::Like => model.like(&column, pattern, false),
                    TextOp::Ilike => model.like(&column, pattern, true),
                    TextOp::Contains => model.like(&column, &format!("%{}%", pattern), false),
                }
            }
            FilterNode::Logical { operator, operands } => {
                trace!(operator = operator.name(), count = operands.len(), "compiling logical");
                let mut predicates = operands
                    .iter()
                    .map(|operand| self.compile(operand, model))
                    .collect::<Result<Vec<_>>>()?;

                let combined = match predicates.len() {
                    0 => {
                        return Err(FilterError::InvalidArity {
                            operator: operator.name().to_string(),
                            expected: "at least one operand",
                            found: 0,
                        })
                    }
                    1 => predicates.pop(),
                    _ => None,
                };

                Ok(match (operator, combined) {
                    (LogicalOp::Not, Some(single)) => model.negate(single),
                    (_, Some(single)) => single,
                    (LogicalOp::And, None) => model.all(predicates),
                    (LogicalOp::Or, None) => model.any(predicates),
                    (LogicalOp::Not, None) => model.negate(model.all(predicates)),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::FilterParser;
    use pretty_assertions::assert_eq;

    /// 把谓词渲染成文本，便于直接断言编译结果的结构。
    struct Echo;

    impl QueryableModel for Echo {
        type Field = String;
        type Predicate = String;

        fn field_accessor(&self, name: &str) -> Result<String> {
            if name.starts_with('x') {
                Err(FilterError::UnknownField(name.to_string()))
            } else {
                Ok(name.to_string())
            }
        }

        fn compare(&self, field: &String, op: ComparisonOp, value: &Scalar) -> Result<String> {
            Ok(format!("{} {} {}", field, op.name(), value))
        }

        fn member_of(&self, field: &String, op: CollectionOp, values: &[Scalar]) -> Result<String> {
            let values: Vec<_> = values.iter().map(|v| v.to_string()).collect();
            Ok(format!("{} {} [{}]", field, op.name(), values.join(",")))
        }

        fn between(&self, field: &String, start: &Scalar, end: &Scalar) -> Result<String> {
            Ok(format!("{} in [{}..{}]", field, start, end))
        }

        fn like(&self, field: &String, pattern: &str, case_insensitive: bool) -> Result<String> {
            let op = if case_insensitive { "ilike" } else { "like" };
            Ok(format!("{} {} '{}'", field, op, pattern))
        }

        fn all(&self, predicates: Vec<String>) -> String {
            format!("({})", predicates.join(" AND "))
        }

        fn any(&self, predicates: Vec<String>) -> String {
            format!("({})", predicates.join(" OR "))
        }

        fn negate(&self, predicate: String) -> String {
            format!("NOT {}", predicate)
        }
    }

    fn compile_str(input: &str) -> Result<String> {
        let node = FilterParser::default().parse(input)?;
        PredicateCompiler::new().compile(&node, &Echo)
    }

    #[test]
    fn test_leaf_dispatch() {
        assert_eq!(compile_str("age:gte:18").unwrap(), "age gte 18");
        assert_eq!(compile_str("id:not_in:1,2").unwrap(), "id not_in [1,2]");
        assert_eq!(compile_str("age:between:65,18").unwrap(), "age in [65..18]");
        assert_eq!(compile_str(r#"city:like:"L_n%""#).unwrap(), "city like 'L_n%'");
        assert_eq!(compile_str(r#"city:ilike:"l%""#).unwrap(), "city ilike 'l%'");
        assert_eq!(compile_str("city:contains:on").unwrap(), "city like '%on%'");
    }

    #[test]
    fn test_logical_nesting_follows_tree() {
        assert_eq!(
            compile_str("a:eq:1 and b:eq:2 or not c:eq:3").unwrap(),
            "((a eq 1 AND b eq 2) OR NOT c eq 3)"
        );
    }

    #[test]
    fn test_unknown_field_propagates() {
        assert_eq!(
            compile_str("a:eq:1 and xyz:eq:2"),
            Err(FilterError::UnknownField("xyz".to_string()))
        );
    }

    #[test]
    fn test_single_operand_degenerates() {
        let leaf = FilterNode::comparison("a", ComparisonOp::Eq, 1.0);
        for operator in [LogicalOp::And, LogicalOp::Or] {
            let node = FilterNode::Logical { operator, operands: vec![leaf.clone()] };
            assert_eq!(PredicateCompiler::new().compile(&node, &Echo).unwrap(), "a eq 1");
        }
    }

    #[test]
    fn test_not_with_one_operand() {
        let node = FilterNode::not(FilterNode::comparison("a", ComparisonOp::Eq, 1.0));
        assert_eq!(PredicateCompiler::new().compile(&node, &Echo).unwrap(), "NOT a eq 1");
    }

    #[test]
    fn test_not_with_many_operands_negates_conjunction() {
        let node = FilterNode::Logical {
            operator: LogicalOp::Not,
            operands: vec![
                FilterNode::comparison("a", ComparisonOp::Eq, 1.0),
                FilterNode::comparison("b", ComparisonOp::Eq, 2.0),
            ],
        };
        assert_eq!(
            PredicateCompiler::new().compile(&node, &Echo).unwrap(),
            "NOT (a eq 1 AND b eq 2)"
        );
    }

    #[test]
    fn test_empty_logical_is_rejected() {
        for operator in [LogicalOp::And, LogicalOp::Or, LogicalOp::Not] {
            let node = FilterNode::Logical { operator, operands: vec![] };
            assert!(matches!(
                PredicateCompiler::new().compile(&node, &Echo),
                Err(FilterError::InvalidArity { found: 0, .. })
            ));
        }
    }
}
