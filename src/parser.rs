//! 过滤表达式语法分析器
//!
//! ## 语法
//!
//! ```text
//! expression      := logical_expr
//! logical_expr    := comparison_expr
//!                  | logical_expr "and" logical_expr
//!                  | logical_expr "or"  logical_expr
//!                  | "not" logical_expr
//! comparison_expr := FIELD ":" OPERATOR ":" value_expr
//! value_expr      := value | value ("," value)+
//! value           := STRING | NUMBER | NAME
//! ```
//!
//! ## 优先级
//!
//! `and`、`or`、`not` 优先级相同。链式表达式从左到右折叠，
//! `not` 作用于紧随其后的比较表达式（或下一个 `not`）：
//!
//! ```text
//! a and b or c     => or(and(a, b), c)
//! not a and b      => and(not(a), b)
//! not not a        => not(not(a))
//! ```
//!
//! 没有分组语法，因此无法写出 `(a or b) and c`。
//!
//! ## 解析流程
//!
//! ```text
//! parse()
//!   └─ parse_logical()            loop: unary (("and" | "or") unary)*
//!        └─ parse_unary()         "not"* comparison
//!             └─ parse_comparison()
//!                  ├─ FIELD ":" OPERATOR ":"
//!                  └─ parse_value_expr()   value ("," value)*
//! ```
//!
//! 每完成一条规则就交给 [`AstBuilder`] 就地构建节点。
//! 语法分析器本身对 `and`/`or`/`not` 使用循环，但编译、求值和释放一棵树
//! 每一层都会递归一次，所以嵌套深度上限为 [`MAX_NESTING_DEPTH`]，
//! 更深的输入视为语法错误。

use tracing::debug;

use crate::ast::{FilterNode, Scalar};
use crate::error::{FilterError, Result};
use crate::lexer::Lexer;
use crate::operator::OperatorRegistry;
use crate::reduce::{AstBuilder, ValueExpr};
use crate::token::{Token, TokenKind};

/// 解析出的树允许的最大 `and`/`or`/`not` 嵌套深度
pub const MAX_NESTING_DEPTH: usize = 256;

/// 可复用的入口：持有运算符注册表，可解析任意多个输入
#[derive(Debug, Clone, Default)]
pub struct FilterParser {
    registry: OperatorRegistry,
}

impl FilterParser {
    pub fn new(registry: OperatorRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &OperatorRegistry {
        &self.registry
    }

    /// 严格解析 `input`。空文本或格式错误的文本都是语法错误。
    pub fn parse(&self, input: &str) -> Result<FilterNode> {
        let tokens: Vec<_> = Lexer::new(input).collect();
        let result = Parser::new(&tokens, AstBuilder::new(&self.registry)).parse();
        match &result {
            Ok(node) => debug!(nodes = node.node_count(), "parsed filter expression"),
            Err(err) => debug!(error = %err, input, "failed to parse filter expression"),
        }
        result
    }
}

struct Parser<'a> {
    tokens: &'a [Token<'a>],
    position: usize,
    builder: AstBuilder<'a>,
}

impl<'a> Parser<'a> {
    fn new(tokens: &'a [Token<'a>], builder: AstBuilder<'a>) -> Self {
        Self {
            tokens,
            position: 0,
            builder,
        }
    }

    /// 返回当前 token，不推进位置
    fn peek(&self) -> Option<&'a Token<'a>> {
        self.tokens.get(self.position)
    }

    /// 返回当前 token 并推进位置
    fn advance(&mut self) -> Option<&'a Token<'a>> {
        let token = self.tokens.get(self.position)?;
        self.position += 1;
        Some(token)
    }

    fn match_token(&self, kind: &TokenKind) -> bool {
        self.peek()
            .is_some_and(|t| std::mem::discriminant(&t.kind) == std::mem::discriminant(kind))
    }

    fn unexpected(token: Option<&Token<'_>>, expected: &str) -> FilterError {
        match token {
            Some(token) => FilterError::syntax(
                format!("expected {}, found {}", expected, token.kind.describe()),
                Some(token.span),
            ),
            None => FilterError::syntax(
                format!("expected {}, but reached end of input", expected),
                None,
            ),
        }
    }

    fn expect_colon(&mut self) -> Result<()> {
        match self.advance() {
            Some(Token { kind: TokenKind::Colon, .. }) => Ok(()),
            other => Err(Self::unexpected(other, "`:`")),
        }
    }

    fn parse(mut self) -> Result<FilterNode> {
        if self.tokens.is_empty() {
            return Err(FilterError::syntax("empty filter expression", None));
        }
        let node = self.parse_logical()?;
        match self.peek() {
            None => Ok(node),
            Some(token) => Err(Self::unexpected(Some(token), "`and`, `or` or end of input")),
        }
    }

    fn check_depth(depth: usize, token: &Token<'_>) -> Result<()> {
        if depth > MAX_NESTING_DEPTH {
            return Err(FilterError::syntax(
                format!("expression nests deeper than {} levels", MAX_NESTING_DEPTH),
                Some(token.span),
            ));
        }
        Ok(())
    }

    /// `unary (("and" | "or") unary)*`，向左折叠。
    ///
    /// 每次折叠都在已解析部分之上增加一层，
    /// 所以树的深度最多为 `链长 + 最长的连续 not 数`。
    fn parse_logical(&mut self) -> Result<FilterNode> {
        let (mut left, mut deepest) = self.parse_unary()?;
        let mut chained = 0usize;
        loop {
            let op = match self.peek() {
                Some(token @ Token { kind: TokenKind::And | TokenKind::Or, .. }) => token,
                _ => return Ok(left),
            };
            self.advance();
            chained += 1;

            let (right, negations) = self.parse_unary()?;
            deepest = deepest.max(negations);
            Self::check_depth(chained + deepest, op)?;

            left = match op.kind {
                TokenKind::And => self.builder.and_op(left, right),
                _ => self.builder.or_op(left, right),
            };
        }
    }

    /// `"not"* comparison`，返回节点以及包裹它的 `not` 个数。
    fn parse_unary(&mut self) -> Result<(FilterNode, usize)> {
        let mut negations = 0usize;
        while let Some(token @ Token { kind: TokenKind::Not, .. }) = self.peek() {
            self.advance();
            negations += 1;
            Self::check_depth(negations, token)?;
        }
        let mut node = self.parse_comparison()?;
        for _ in 0..negations {
            node = self.builder.not_op(vec![node]);
        }
        Ok((node, negations))
    }

    fn parse_comparison(&mut self) -> Result<FilterNode> {
        let field = match self.advance() {
            Some(Token { kind: TokenKind::Identifier(name), .. }) => self.builder.field(name),
            other => return Err(Self::unexpected(other, "field name")),
        };
        self.expect_colon()?;

        let operator = match self.advance() {
            Some(Token { kind: TokenKind::Identifier(name), .. })
                if self.builder.registry().is_field_operator(name) =>
            {
                self.builder.operator(name)
            }
            other => return Err(Self::unexpected(other, "operator")),
        };
        self.expect_colon()?;

        let value = self.parse_value_expr()?;
        self.builder.comparison_expr(field, operator, value)
    }

    fn parse_value_expr(&mut self) -> Result<ValueExpr> {
        let first = self.parse_value()?;
        if !self.match_token(&TokenKind::Comma) {
            return Ok(self.builder.single_value_expr(first));
        }

        let mut values = vec![first];
        while self.match_token(&TokenKind::Comma) {
            self.advance();
            values.push(self.parse_value()?);
        }
        Ok(self.builder.list_value_expr(values))
    }

    fn parse_value(&mut self) -> Result<Scalar> {
        match self.advance() {
            Some(Token { kind: TokenKind::String(raw), .. }) => Ok(self.builder.string_value(raw)),
            Some(Token { kind: TokenKind::Number(raw), span }) => self.builder.number_value(raw, *span),
            Some(Token { kind: TokenKind::Identifier(name), .. }) => Ok(self.builder.name_value(name)),
            other => Err(Self::unexpected(other, "value")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operator::{CollectionOp, ComparisonOp, LogicalOp, TextOp};
    use crate::token::Span;
    use pretty_assertions::assert_eq;

    fn parse_string(input: &str) -> Result<FilterNode> {
        FilterParser::default().parse(input)
    }

    fn eq(field: &str, value: &str) -> FilterNode {
        FilterNode::comparison(field, ComparisonOp::Eq, value)
    }

    #[test]
    fn test_simple_comparison() {
        assert_eq!(parse_string("active:eq:Y").unwrap(), eq("active", "Y"));
    }

    #[test]
    fn test_and_expression() {
        assert_eq!(
            parse_string("active:eq:Y and admin:eq:Y").unwrap(),
            FilterNode::Logical {
                operator: LogicalOp::And,
                operands: vec![eq("active", "Y"), eq("admin", "Y")],
            }
        );
    }

    #[test]
    fn test_numeric_list_becomes_doubles() {
        assert_eq!(
            parse_string("id:in:1,2,3").unwrap(),
            FilterNode::collection(
                "id",
                CollectionOp::In,
                vec![Scalar::Number(1.0), Scalar::Number(2.0), Scalar::Number(3.0)],
            )
        );
    }

    #[test]
    fn test_between() {
        assert_eq!(
            parse_string("age:between:18,65").unwrap(),
            FilterNode::range("age", 18.0, 65.0)
        );
        assert!(matches!(
            parse_string("age:between:18,65,70"),
            Err(FilterError::InvalidArity { found: 3, .. })
        ));
    }

    #[test]
    fn test_empty_and_garbage_are_syntax_errors() {
        for input in ["", "   ", "not a valid expr", "active:eq:", "active:eq:Y and", ":eq:Y"] {
            let err = parse_string(input).unwrap_err();
            assert!(err.is_syntax(), "{:?} gave {:?}", input, err);
        }
    }

    #[test]
    fn test_error_points_at_offending_token() {
        let err = parse_string("active:equals:Y").unwrap_err();
        assert_eq!(
            err,
            FilterError::Syntax {
                message: "expected operator, found name `equals`".to_string(),
                span: Some(Span::new(7, 13)),
            }
        );
    }

    #[test]
    fn test_keywords_cannot_be_fields_or_values() {
        assert!(parse_string("and:eq:Y").unwrap_err().is_syntax());
        assert!(parse_string("active:eq:or").unwrap_err().is_syntax());
        // 运算符名称出现在运算符位置之外是允许的
        assert_eq!(parse_string("eq:eq:eq").unwrap(), eq("eq", "eq"));
    }

    #[test]
    fn test_quoted_and_bare_values_are_equal() {
        assert_eq!(
            parse_string(r#"name:eq:"Smith""#).unwrap(),
            parse_string("name:eq:Smith").unwrap()
        );
        assert_eq!(
            parse_string(r#"name:eq:"John Smith""#).unwrap(),
            eq("name", "John Smith")
        );
    }

    #[test]
    fn test_chains_fold_left() {
        let node = parse_string("a:eq:1 and b:eq:2 or c:eq:3").unwrap();
        let num = |f: &str, n: f64| FilterNode::comparison(f, ComparisonOp::Eq, n);
        assert_eq!(
            node,
            FilterNode::or(FilterNode::and(num("a", 1.0), num("b", 2.0)), num("c", 3.0))
        );
    }

    #[test]
    fn test_not_binds_to_next_comparison() {
        assert_eq!(
            parse_string("not active:eq:Y and admin:eq:Y").unwrap(),
            FilterNode::and(FilterNode::not(eq("active", "Y")), eq("admin", "Y"))
        );
        assert_eq!(
            parse_string("not not active:eq:Y").unwrap(),
            FilterNode::not(FilterNode::not(eq("active", "Y")))
        );
        assert_eq!(
            parse_string("active:eq:Y or not admin:eq:Y").unwrap(),
            FilterNode::or(eq("active", "Y"), FilterNode::not(eq("admin", "Y")))
        );
    }

    #[test]
    fn test_text_operators() {
        assert_eq!(
            parse_string(r#"surname:ilike:"sm%""#).unwrap(),
            FilterNode::text_search("surname", TextOp::Ilike, "sm%")
        );
        assert_eq!(
            parse_string("city:contains:on").unwrap(),
            FilterNode::text_search("city", TextOp::Contains, "on")
        );
    }

    #[test]
    fn test_parsing_is_deterministic() {
        let input = r#"id:not_in:4,"x",y or not age:between:1.5,2e1 and city:like:"L%""#;
        let parser = FilterParser::default();
        assert_eq!(parser.parse(input).unwrap(), parser.parse(input).unwrap());
    }

    #[test]
    fn test_nesting_is_capped() {
        let chain = |terms: usize| vec!["id:eq:1"; terms].join(" and ");
        let nots = |count: usize| format!("{}active:eq:Y", "not ".repeat(count));

        let node = parse_string(&chain(MAX_NESTING_DEPTH + 1)).unwrap();
        assert_eq!(node.node_count(), 2 * MAX_NESTING_DEPTH + 1);
        assert!(parse_string(&chain(MAX_NESTING_DEPTH + 2)).unwrap_err().is_syntax());
        assert!(parse_string(&chain(600)).unwrap_err().is_syntax());

        assert_eq!(parse_string(&nots(MAX_NESTING_DEPTH)).unwrap().node_count(), MAX_NESTING_DEPTH + 1);
        assert!(parse_string(&nots(MAX_NESTING_DEPTH + 1)).unwrap_err().is_syntax());
        assert!(parse_string(&nots(100_000)).unwrap_err().is_syntax());
    }

    #[test]
    fn test_chain_and_negation_depths_add_up() {
        let input = format!(
            "{}a:eq:1 and {}",
            "not ".repeat(200),
            vec!["b:eq:2"; 100].join(" or ")
        );
        let err = parse_string(&input).unwrap_err();
        assert!(
            matches!(&err, FilterError::Syntax { message, .. } if message.contains("nests deeper")),
            "{}",
            err
        );
    }
}
