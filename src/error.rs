//! 解析和编译过滤表达式时产生的错误。

use thiserror::Error;

use crate::token::Span;

pub type Result<T> = std::result::Result<T, FilterError>;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum FilterError {
    /// 文本不符合过滤语法。
    #[error("syntax error: {message}")]
    Syntax { message: String, span: Option<Span> },

    #[error("unknown operator `{0}`")]
    UnknownOperator(String),

    #[error("operator `{operator}` expects {expected}, got {found}")]
    InvalidArity {
        operator: String,
        expected: &'static str,
        found: usize,
    },

    /// 目标模型没有该名称的字段。
    #[error("unknown field `{0}`")]
    UnknownField(String),

    #[error("invalid value for field `{field}`: {reason}")]
    InvalidValue { field: String, reason: String },
}

impl FilterError {
    pub(crate) fn syntax(message: impl Into<String>, span: Option<Span>) -> Self {
        FilterError::Syntax {
            message: message.into(),
            span,
        }
    }

    pub(crate) fn invalid_value(field: &str, reason: impl Into<String>) -> Self {
        FilterError::InvalidValue {
            field: field.to_string(),
            reason: reason.into(),
        }
    }

    pub fn is_syntax(&self) -> bool {
        matches!(self, FilterError::Syntax { .. })
    }
}
