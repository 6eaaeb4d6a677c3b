//! 过滤表达式语言：把形如
//! `active:eq:Y and not city:in:"Leeds","York"` 的字符串解析成 [`FilterNode`] 树，
//! 再把树编译成 [`QueryableModel`] 的谓词。
//!
//! ```text
//! text -> ParseCache / FilterParser -> FilterNode -> PredicateCompiler -> model predicate
//! ```
//!
//! crate 自带两个模型：[`SqlModel`] 构建参数化的 sea-query 表达式，
//! [`RecordModel`] 直接对内存中的 JSON 记录求值。

pub mod ast;
pub mod cache;
pub mod compiler;
pub mod config;
pub mod error;
pub mod lexer;
pub mod memory;
pub mod operator;
pub mod parser;
pub mod reduce;
pub mod schema;
pub mod sql_compiler;
pub mod token;

pub use ast::{FilterNode, Scalar};
pub use cache::{CachePolicy, CacheStats, ParseCache};
pub use compiler::{PredicateCompiler, QueryableModel};
pub use config::{ConfigError, FilterConfig};
pub use error::{FilterError, Result};
pub use memory::{RecordModel, RecordPredicate};
pub use operator::{Family, Operator, OperatorRegistry};
pub use parser::FilterParser;
pub use schema::{FieldType, TableSchema};
pub use sql_compiler::{CompiledQuery, Page, SqlCompiler, SqlModel};
