//! 内存后端：谓词直接对 JSON 记录求值。
//!
//! 求值遵循 SQL 三值逻辑，因此同一个过滤条件在这里选出的行与数据库一致：
//! 字段缺失、为 null 或类型不符时结果为未知，`not 未知` 仍是未知，
//! 只有确定的 `true` 才算匹配。

use std::cmp::Ordering;

use regex::Regex;
use serde_json::Value;

use crate::ast::Scalar;
use crate::compiler::QueryableModel;
use crate::error::{FilterError, Result};
use crate::operator::{CollectionOp, ComparisonOp};
use crate::schema::{Datum, FieldRef, TableSchema};

#[derive(Debug, Clone)]
pub enum RecordPredicate {
    Compare {
        field: String,
        op: ComparisonOp,
        value: Datum,
    },
    Member {
        field: String,
        negated: bool,
        values: Vec<Datum>,
    },
    Between {
        field: String,
        start: Datum,
        end: Datum,
    },
    /// 转换成锚定正则的 LIKE 模式
    Pattern { field: String, regex: Regex },
    All(Vec<RecordPredicate>),
    Any(Vec<RecordPredicate>),
    Not(Box<RecordPredicate>),
}

fn read_field(record: &Value, field: &str) -> Option<Datum> {
    match record.get(field)? {
        Value::String(s) => Some(Datum::Text(s.clone())),
        Value::Number(n) => n.as_f64().map(Datum::Number),
        _ => None,
    }
}

fn compare_datum(left: &Datum, right: &Datum) -> Option<Ordering> {
    match (left, right) {
        (Datum::Text(a), Datum::Text(b)) => Some(a.cmp(b)),
        (Datum::Number(a), Datum::Number(b)) => a.partial_cmp(b),
        _ => None,
    }
}

impl RecordPredicate {
    /// 结果未知时返回 `None`。
    pub fn evaluate(&self, record: &Value) -> Option<bool> {
        match self {
            RecordPredicate::Compare { field, op, value } => {
                let ordering = compare_datum(&read_field(record, field)?, value)?;
                Some(match op {
                    ComparisonOp::Eq => ordering == Ordering::Equal,
                    ComparisonOp::Neq => ordering != Ordering::Equal,
                    ComparisonOp::Gt => ordering == Ordering::Greater,
                    ComparisonOp::Gte => ordering != Ordering::Less,
                    ComparisonOp::Lt => ordering == Ordering::Less,
                    ComparisonOp::Lte => ordering != Ordering::Greater,
                })
            }
            RecordPredicate::Member {
                field,
                negated,
                values,
            } => {
                let actual = read_field(record, field)?;
                let mut unknown = false;
                for value in values {
                    match compare_datum(&actual, value) {
                        Some(Ordering::Equal) => return Some(!negated),
                        Some(_) => {}
                        None => unknown = true,
                    }
                }
                if unknown {
                    None
                } else {
                    Some(*negated)
                }
            }
            RecordPredicate::Between { field, start, end } => {
                let actual = read_field(record, field)?;
                let above = compare_datum(&actual, start)? != Ordering::Less;
                let below = compare_datum(&actual, end)? != Ordering::Greater;
                Some(above && below)
            }
            RecordPredicate::Pattern { field, regex } => match read_field(record, field)? {
                Datum::Text(s) => Some(regex.is_match(&s)),
                Datum::Number(_) => None,
            },
            RecordPredicate::All(parts) => {
                let mut result = Some(true);
                for part in parts {
                    match part.evaluate(record) {
                        Some(false) => return Some(false),
                        Some(true) => {}
                        None => result = None,
                    }
                }
                result
            }
            RecordPredicate::Any(parts) => {
                let mut result = Some(false);
                for part in parts {
                    match part.evaluate(record) {
                        Some(true) => return Some(true),
                        Some(false) => {}
                        None => result = None,
                    }
                }
                result
            }
            RecordPredicate::Not(inner) => inner.evaluate(record).map(|b| !b),
        }
    }

    pub fn matches(&self, record: &Value) -> bool {
        self.evaluate(record) == Some(true)
    }
}

/// 把 SQL LIKE 通配符（`%`、`_`）转换成锚定的正则表达式。
///
/// 与 PostgreSQL 默认的 `LIKE` 转义一致，`\` 转义下一个字符，
/// 所以 `\%` 匹配字面的百分号。末尾的 `\` 会被拒绝。
fn like_to_regex(field: &str, pattern: &str, case_insensitive: bool) -> Result<Regex> {
    let mut source = String::from(if case_insensitive { "(?si)^" } else { "(?s)^" });
    let mut buf = [0u8; 4];
    let mut chars = pattern.chars();
    while let Some(c) = chars.next() {
        match c {
            '%' => source.push_str(".*"),
            '_' => source.push('.'),
            '\\' => match chars.next() {
                Some(escaped) => source.push_str(&regex::escape(escaped.encode_utf8(&mut buf))),
                None => {
                    return Err(FilterError::invalid_value(
                        field,
                        "pattern must not end with the escape character",
                    ))
                }
            },
            c => source.push_str(&regex::escape(c.encode_utf8(&mut buf))),
        }
    }
    source.push('$');
    Regex::new(&source).map_err(|e| FilterError::invalid_value(field, e.to_string()))
}

/// 基于 [`TableSchema`] 描述的 JSON 对象记录的 `QueryableModel`。
#[derive(Debug, Clone)]
pub struct RecordModel {
    schema: TableSchema,
}

impl RecordModel {
    pub fn new(schema: TableSchema) -> Self {
        Self { schema }
    }

    pub fn schema(&self) -> &TableSchema {
        &self.schema
    }

    pub fn filter<'r>(&self, predicate: &RecordPredicate, records: &'r [Value]) -> Vec<&'r Value> {
        records.iter().filter(|r| predicate.matches(r)).collect()
    }
}

impl QueryableModel for RecordModel {
    type Field = FieldRef;
    type Predicate = RecordPredicate;

    fn field_accessor(&self, name: &str) -> Result<FieldRef> {
        self.schema.field_ref(name)
    }

    fn compare(&self, field: &FieldRef, op: ComparisonOp, value: &Scalar) -> Result<RecordPredicate> {
        Ok(RecordPredicate::Compare {
            field: field.name.clone(),
            op,
            value: field.coerce(value)?,
        })
    }

    fn member_of(&self, field: &FieldRef, op: CollectionOp, values: &[Scalar]) -> Result<RecordPredicate> {
        Ok(RecordPredicate::Member {
            field: field.name.clone(),
            negated: op == CollectionOp::NotIn,
            values: field.coerce_all(values)?,
        })
    }

    fn between(&self, field: &FieldRef, start: &Scalar, end: &Scalar) -> Result<RecordPredicate> {
        Ok(RecordPredicate::Between {
            field: field.name.clone(),
            start: field.coerce(start)?,
            end: field.coerce(end)?,
        })
    }

    fn like(&self, field: &FieldRef, pattern: &str, case_insensitive: bool) -> Result<RecordPredicate> {
        field.require_text()?;
        Ok(RecordPredicate::Pattern {
            field: field.name.clone(),
            regex: like_to_regex(&field.name, pattern, case_insensitive)?,
        })
    }

    fn all(&self, predicates: Vec<RecordPredicate>) -> RecordPredicate {
        RecordPredicate::All(predicates)
    }

    fn any(&self, predicates: Vec<RecordPredicate>) -> RecordPredicate {
        RecordPredicate::Any(predicates)
    }

    fn negate(&self, predicate: RecordPredicate) -> RecordPredicate {
        RecordPredicate::Not(Box::new(predicate))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::PredicateCompiler;
    use crate::parser::FilterParser;
    use serde_json::json;

    fn users() -> Vec<Value> {
        vec![
            json!({"id": 1, "surname": "Smith", "city": "London", "active": "Y", "admin": "Y"}),
            json!({"id": 2, "surname": "Jones", "city": "Leeds", "active": "Y", "admin": "N"}),
            json!({"id": 3, "surname": "smithers", "city": "Bath", "active": "N", "admin": "N"}),
            json!({"id": 4, "surname": "Brown", "city": null, "active": "Y", "admin": "N"}),
        ]
    }

    fn select_ids(input: &str) -> Result<Vec<i64>> {
        let model = RecordModel::new(TableSchema::users());
        let node = FilterParser::default().parse(input)?;
        let predicate = PredicateCompiler::new().compile(&node, &model)?;
        let records = users();
        Ok(model
            .filter(&predicate, &records)
            .into_iter()
            .filter_map(|r| r["id"].as_i64())
            .collect())
    }

    #[test]
    fn test_comparisons() {
        assert_eq!(select_ids("active:eq:Y").unwrap(), vec![1, 2, 4]);
        assert_eq!(select_ids("active:eq:Y and admin:eq:Y").unwrap(), vec![1]);
        assert_eq!(select_ids("id:gt:2").unwrap(), vec![3, 4]);
        assert_eq!(select_ids("id:lte:2").unwrap(), vec![1, 2]);
    }

    #[test]
    fn test_collection_and_range() {
        assert_eq!(select_ids("id:in:1,3").unwrap(), vec![1, 3]);
        assert_eq!(select_ids("id:not_in:1,3").unwrap(), vec![2, 4]);
        assert_eq!(select_ids("id:between:2,3").unwrap(), vec![2, 3]);
        // 边界不会被重新排序
        assert!(select_ids("id:between:3,2").unwrap().is_empty());
    }

    #[test]
    fn test_patterns() {
        assert_eq!(select_ids(r#"surname:like:"Smith%""#).unwrap(), vec![1]);
        assert_eq!(select_ids(r#"surname:ilike:"smith%""#).unwrap(), vec![1, 3]);
        assert_eq!(select_ids("city:contains:ee").unwrap(), vec![2]);
        assert_eq!(select_ids("city:like:L_____").unwrap(), vec![1]);
        // 模式中的正则元字符按字面处理
        assert!(select_ids("city:like:\"L.*\"").unwrap().is_empty());
    }

    #[test]
    fn test_null_fields_are_unknown() {
        // 记录 4 的 city 为 null：条件本身和它的否定都不会选中它
        assert_eq!(select_ids("city:eq:London").unwrap(), vec![1]);
        assert_eq!(select_ids("not city:eq:London").unwrap(), vec![2, 3]);
        assert_eq!(select_ids("city:eq:London or active:eq:Y").unwrap(), vec![1, 2, 4]);
    }

    #[test]
    fn test_negated_conjunction_with_many_operands() {
        let model = RecordModel::new(TableSchema::users());
        let compiler = PredicateCompiler::new();
        let parser = FilterParser::default();
        let node = crate::ast::FilterNode::Logical {
            operator: crate::operator::LogicalOp::Not,
            operands: vec![
                parser.parse("active:eq:Y").unwrap(),
                parser.parse("admin:eq:N").unwrap(),
            ],
        };
        let predicate = compiler.compile(&node, &model).unwrap();
        let records = users();
        let ids: Vec<_> = model
            .filter(&predicate, &records)
            .into_iter()
            .filter_map(|r| r["id"].as_i64())
            .collect();
        assert_eq!(ids, vec![1, 3]);
    }

    #[test]
    fn test_unknown_field() {
        assert_eq!(
            select_ids("nickname:eq:bob"),
            Err(FilterError::UnknownField("nickname".into()))
        );
    }

    #[test]
    fn test_backslash_escapes_wildcards() {
        let re = like_to_regex("f", r"100\%", false).unwrap();
        assert!(re.is_match("100%"));
        assert!(!re.is_match("1000"));

        let re = like_to_regex("f", r"a\_b", false).unwrap();
        assert!(re.is_match("a_b"));
        assert!(!re.is_match("axb"));

        assert!(like_to_regex("f", r"a\\", false).unwrap().is_match(r"a\"));
        assert!(matches!(
            like_to_regex("f", r"a\", false),
            Err(FilterError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_deepest_tree_evaluates_on_default_stack() {
        let input = vec!["id:neq:3"; crate::parser::MAX_NESTING_DEPTH + 1].join(" or ");
        assert_eq!(select_ids(&input).unwrap(), vec![1, 2, 4]);

        let negated = format!("{}id:eq:3", "not ".repeat(crate::parser::MAX_NESTING_DEPTH));
        assert_eq!(select_ids(&negated).unwrap(), vec![3]);
    }

    #[test]
    fn test_like_to_regex() {
        let re = like_to_regex("f", "a%b_c", false).unwrap();
        assert!(re.is_match("aXXbYc"));
        assert!(re.is_match("abYc"));
        assert!(!re.is_match("abc"));
        assert!(!re.is_match("AbYc"));
        assert!(like_to_regex("f", "a%", true).unwrap().is_match("ABC"));
    }
}
