//! AST 构建回调。
//!
//! 语法分析器每完成一条语法规则就调用其中一个回调，
//! 节点在解析过程中直接构建。每个回调对应一条规则：
//!
//! ```text
//! field              -> identifier text
//! operator           -> keyword text (classified later, in comparison_expr)
//! string_value       -> text with one surrounding pair of quotes removed
//! number_value       -> f64
//! name_value         -> identifier text
//! single_value_expr  -> the value
//! list_value_expr    -> values in written order
//! comparison_expr    -> Comparison | Collection | Range | TextSearch
//! and_op / or_op     -> Logical over the two reduced sides
//! not_op             -> Logical(not) over the received operands
//! ```

use crate::ast::{FilterNode, Scalar};
use crate::error::{FilterError, Result};
use crate::operator::{LogicalOp, Operator, OperatorRegistry};
use crate::token::Span;

/// 比较表达式的右侧，在运算符决定其形态之前的形式。
#[derive(Debug, Clone, PartialEq)]
pub enum ValueExpr {
    Single(Scalar),
    List(Vec<Scalar>),
}

impl ValueExpr {
    fn len(&self) -> usize {
        match self {
            ValueExpr::Single(_) => 1,
            ValueExpr::List(values) => values.len(),
        }
    }
}

pub struct AstBuilder<'r> {
    registry: &'r OperatorRegistry,
}

impl<'r> AstBuilder<'r> {
    pub fn new(registry: &'r OperatorRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &'r OperatorRegistry {
        self.registry
    }

    pub fn field(&self, text: &str) -> String {
        text.to_string()
    }

    pub fn operator(&self, text: &str) -> String {
        text.to_string()
    }

    pub fn string_value(&self, raw: &str) -> Scalar {
        let inner = raw
            .strip_prefix('"')
            .and_then(|s| s.strip_suffix('"'))
            .unwrap_or(raw);
        Scalar::Text(inner.to_string())
    }

    pub fn number_value(&self, raw: &str, span: Span) -> Result<Scalar> {
        raw.parse::<f64>()
            .map(Scalar::Number)
            .map_err(|e| FilterError::syntax(format!("invalid number `{}`: {}", raw, e), Some(span)))
    }

    pub fn name_value(&self, text: &str) -> Scalar {
        Scalar::Text(text.to_string())
    }

    pub fn single_value_expr(&self, value: Scalar) -> ValueExpr {
        ValueExpr::Single(value)
    }

    pub fn list_value_expr(&self, values: Vec<Scalar>) -> ValueExpr {
        ValueExpr::List(values)
    }

    /// 按族对 `operator` 分类，并构建对应的叶子节点。
    pub fn comparison_expr(
        &self,
        field: String,
        operator: String,
        value: ValueExpr,
    ) -> Result<FilterNode> {
        let op = self.registry.member_for(&operator)?;
        match op {
            Operator::Comparison(operator) => match value {
                ValueExpr::Single(value) => Ok(FilterNode::Comparison {
                    field,
                    operator,
                    value,
                }),
                list => Err(arity(op, "a single value", list.len())),
            },
            Operator::Collection(operator) => {
                let values = match value {
                    ValueExpr::Single(value) => vec![value],
                    ValueExpr::List(values) => values,
                };
                Ok(FilterNode::Collection {
                    field,
                    operator,
                    values,
                })
            }
            Operator::Range(_) => match value {
                ValueExpr::List(values) => match <[Scalar; 2]>::try_from(values) {
                    Ok([start, end]) => Ok(FilterNode::Range { field, start, end }),
                    Err(values) => Err(arity(op, "exactly two values", values.len())),
                },
                single => Err(arity(op, "exactly two values", single.len())),
            },
            Operator::Text(operator) => match value {
                ValueExpr::Single(value) => Ok(FilterNode::TextSearch {
                    field,
                    operator,
                    pattern: value.to_string(),
                }),
                list => Err(arity(op, "a single pattern", list.len())),
            },
            Operator::Logical(_) => Err(FilterError::UnknownOperator(operator)),
        }
    }

    pub fn and_op(&self, left: FilterNode, right: FilterNode) -> FilterNode {
        FilterNode::Logical {
            operator: LogicalOp::And,
            operands: vec![left, right],
        }
    }

    pub fn or_op(&self, left: FilterNode, right: FilterNode) -> FilterNode {
        FilterNode::Logical {
            operator: LogicalOp::Or,
            operands: vec![left, right],
        }
    }

    pub fn not_op(&self, operands: Vec<FilterNode>) -> FilterNode {
        FilterNode::Logical {
            operator: LogicalOp::Not,
            operands,
        }
    }
}

fn arity(op: Operator, expected: &'static str, found: usize) -> FilterError {
    FilterError::InvalidArity {
        operator: op.name().to_string(),
        expected,
        found,
    }
}
