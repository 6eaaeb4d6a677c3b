//! SQL 后端：把过滤树编译成 sea-query 表达式，
//! 并包装成参数化的 SELECT 语句。

use sea_query::{
    Asterisk, Expr, Func, Iden, LikeExpr, PostgresQueryBuilder, Query, QueryStatementWriter,
    SelectStatement, SimpleExpr, Value, Values,
};

use crate::ast::{FilterNode, Scalar};
use crate::compiler::{PredicateCompiler, QueryableModel};
use crate::error::Result;
use crate::operator::{CollectionOp, ComparisonOp};
use crate::schema::{Datum, FieldRef, FieldType, TableSchema};

/// sea-query 使用的表标识符
#[derive(Debug, Clone)]
pub struct TableName(pub String);

impl Iden for TableName {
    fn unquoted(&self, s: &mut dyn std::fmt::Write) {
        let _ = s.write_str(&self.0);
    }
}

/// 列标识符包装
#[derive(Debug, Clone)]
pub struct ColumnName(pub String);

impl Iden for ColumnName {
    fn unquoted(&self, s: &mut dyn std::fmt::Write) {
        let _ = s.write_str(&self.0);
    }
}

/// 谓词为单表 sea-query 表达式的 `QueryableModel`
#[derive(Debug, Clone)]
pub struct SqlModel {
    schema: TableSchema,
}

impl SqlModel {
    pub fn new(schema: TableSchema) -> Self {
        Self { schema }
    }

    pub fn schema(&self) -> &TableSchema {
        &self.schema
    }

    fn column(&self, field: &FieldRef) -> Expr {
        Expr::col(ColumnName(field.name.clone()))
    }

    fn value(&self, field: &FieldRef, scalar: &Scalar) -> Result<Value> {
        Ok(match field.coerce(scalar)? {
            Datum::Text(s) => Value::String(Some(Box::new(s))),
            Datum::Number(n) if field.ty == FieldType::Integer && is_integral(n) => {
                Value::BigInt(Some(n as i64))
            }
            Datum::Number(n) => Value::Double(Some(n)),
        })
    }
}

/// `i64::MAX as f64` 会向上舍入为 2^63，因此上界必须是开区间
fn is_integral(n: f64) -> bool {
    const TWO_POW_63: f64 = 9_223_372_036_854_775_808.0;
    n.fract() == 0.0 && (-TWO_POW_63..TWO_POW_63).contains(&n)
}

impl QueryableModel for SqlModel {
    type Field = FieldRef;
    type Predicate = SimpleExpr;

    fn field_accessor(&self, name: &str) -> Result<FieldRef> {
        self.schema.field_ref(name)
    }

    fn compare(&self, field: &FieldRef, op: ComparisonOp, value: &Scalar) -> Result<SimpleExpr> {
        let col = self.column(field);
        let val = self.value(field, value)?;

        let expr = match op {
            ComparisonOp::Eq => col.eq(val),
            ComparisonOp::Neq => col.ne(val),
            ComparisonOp::Gt => col.gt(val),
            ComparisonOp::Gte => col.gte(val),
            ComparisonOp::Lt => col.lt(val),
            ComparisonOp::Lte => col.lte(val),
        };

        Ok(expr)
    }

    fn member_of(&self, field: &FieldRef, op: CollectionOp, values: &[Scalar]) -> Result<SimpleExpr> {
        let in_values: Vec<Value> = values
            .iter()
            .map(|v| self.value(field, v))
            .collect::<Result<Vec<_>>>()?;

        Ok(match op {
            CollectionOp::In => self.column(field).is_in(in_values),
            CollectionOp::NotIn => self.column(field).is_not_in(in_values),
        })
    }

    fn between(&self, field: &FieldRef, start: &Scalar, end: &Scalar) -> Result<SimpleExpr> {
        let start = self.value(field, start)?;
        let end = self.value(field, end)?;
        Ok(self.column(field).between(start, end))
    }

    fn like(&self, field: &FieldRef, pattern: &str, case_insensitive: bool) -> Result<SimpleExpr> {
        field.require_text()?;
        if case_insensitive {
            // 两侧都用 LOWER()，ILIKE 在各数据库上行为一致
            Ok(Expr::expr(Func::lower(self.column(field))).like(LikeExpr::new(pattern.to_lowercase())))
        } else {
            Ok(self.column(field).like(LikeExpr::new(pattern)))
        }
    }

    fn all(&self, predicates: Vec<SimpleExpr>) -> SimpleExpr {
        predicates
            .into_iter()
            .reduce(|acc, expr| acc.and(expr))
            .unwrap_or_else(|| Expr::val(true).into())
    }

    fn any(&self, predicates: Vec<SimpleExpr>) -> SimpleExpr {
        predicates
            .into_iter()
            .reduce(|acc, expr| acc.or(expr))
            .unwrap_or_else(|| Expr::val(false).into())
    }

    fn negate(&self, predicate: SimpleExpr) -> SimpleExpr {
        predicate.not()
    }
}

/// 结果页（从 1 开始）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    number: u64,
    per_page: u64,
}

impl Page {
    /// 小于 1 的页码按第一页处理
    pub fn new(number: u64, per_page: u64) -> Self {
        Self {
            number: number.max(1),
            per_page,
        }
    }

    pub fn number(&self) -> u64 {
        self.number
    }

    pub fn per_page(&self) -> u64 {
        self.per_page
    }

    /// 超出 `u64` 范围的页码做饱和运算，不会回绕
    pub fn offset(&self) -> u64 {
        self.number.saturating_sub(1).saturating_mul(self.per_page)
    }
}

/// 渲染后的语句：带 `$n` 占位符的 SQL 文本以及绑定的值
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledQuery {
    pub sql: String,
    pub values: Values,
}

impl CompiledQuery {
    fn from_statement(select: &SelectStatement) -> Self {
        let (sql, values) = select.build(PostgresQueryBuilder);
        Self { sql, values }
    }
}

/// 根据可选的过滤树为单表构建行查询和计数查询。
/// `None` 表示没有过滤条件：查询选出所有行。
#[derive(Debug, Clone)]
pub struct SqlCompiler {
    model: SqlModel,
    compiler: PredicateCompiler,
}

impl SqlCompiler {
    pub fn new(schema: TableSchema) -> Self {
        Self {
            model: SqlModel::new(schema),
            compiler: PredicateCompiler::new(),
        }
    }

    pub fn model(&self) -> &SqlModel {
        &self.model
    }

    pub fn predicate(&self, node: &FilterNode) -> Result<SimpleExpr> {
        self.compiler.compile(node, &self.model)
    }

    fn base_select(&self, filter: Option<&FilterNode>) -> Result<SelectStatement> {
        let mut select = Query::select();
        select.from(TableName(self.model.schema.name.clone()));
        if let Some(node) = filter {
            select.and_where(self.predicate(node)?);
        }
        Ok(select)
    }

    pub fn select(&self, filter: Option<&FilterNode>) -> Result<CompiledQuery> {
        let mut select = self.base_select(filter)?;
        select.column(Asterisk);
        Ok(CompiledQuery::from_statement(&select))
    }

    pub fn select_page(&self, filter: Option<&FilterNode>, page: Page) -> Result<CompiledQuery> {
        let mut select = self.base_select(filter)?;
        select
            .column(Asterisk)
            .limit(page.per_page)
            .offset(page.offset());
        Ok(CompiledQuery::from_statement(&select))
    }

    pub fn count(&self, filter: Option<&FilterNode>) -> Result<CompiledQuery> {
        let mut select = self.base_select(filter)?;
        select.expr(Func::count(Expr::col(Asterisk)));
        Ok(CompiledQuery::from_statement(&select))
    }
}
