//! 内置 `QueryableModel` 实现使用的带类型字段模式。

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::ast::Scalar;
use crate::error::{FilterError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    Text,
    Integer,
    Real,
}

/// 命名的表及其可过滤字段
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableSchema {
    pub name: String,
    pub fields: BTreeMap<String, FieldType>,
}

/// 解析后的字段：证明模式中存在该字段，并带上其类型
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldRef {
    pub name: String,
    pub ty: FieldType,
}

/// 按字段类型转换后的字面量
#[derive(Debug, Clone, PartialEq)]
pub enum Datum {
    Text(String),
    Number(f64),
}

impl TableSchema {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            fields: BTreeMap::new(),
        }
    }

    pub fn with_field(mut self, name: &str, ty: FieldType) -> Self {
        self.fields.insert(name.to_string(), ty);
        self
    }

    pub fn field_ref(&self, name: &str) -> Result<FieldRef> {
        self.fields
            .get(name)
            .map(|ty| FieldRef {
                name: name.to_string(),
                ty: *ty,
            })
            .ok_or_else(|| FilterError::UnknownField(name.to_string()))
    }

    /// 演示应用的 `users` 表
    pub fn users() -> Self {
        let mut schema = Self::new("users").with_field("id", FieldType::Integer);
        for name in [
            "userid", "surname", "forename", "telno", "addr1", "addr2", "city", "state",
            "postcode", "active", "admin",
        ] {
            schema = schema.with_field(name, FieldType::Text);
        }
        schema
    }
}

impl FieldRef {
    pub fn coerce(&self, value: &Scalar) -> Result<Datum> {
        match (self.ty, value) {
            (FieldType::Text, value) => Ok(Datum::Text(value.to_string())),
            (FieldType::Integer | FieldType::Real, Scalar::Number(n)) => Ok(Datum::Number(*n)),
            (FieldType::Integer | FieldType::Real, Scalar::Text(s)) => s
                .trim()
                .parse::<f64>()
                .ok()
                .filter(|n| n.is_finite())
                .map(Datum::Number)
                .ok_or_else(|| FilterError::invalid_value(&self.name, format!("`{}` is not a number", s))),
        }
    }

    pub fn coerce_all(&self, values: &[Scalar]) -> Result<Vec<Datum>> {
        values.iter().map(|v| self.coerce(v)).collect()
    }

    /// 模式匹配只适用于文本字段
    pub fn require_text(&self) -> Result<()> {
        if self.ty == FieldType::Text {
            Ok(())
        } else {
            Err(FilterError::invalid_value(
                &self.name,
                "pattern operators apply to text fields only",
            ))
        }
    }
}
