//! 过滤语言的 token 定义

use serde::{Deserialize, Serialize};

/// Token 是语言的最小单位，带有类型和位置
#[derive(Debug, Clone, PartialEq)]
pub struct Token<'a> {
    pub kind: TokenKind<'a>,
    pub span: Span,
}

/// Token 的类型
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind<'a> {
    // 关键字
    And, // "and"
    Or,  // "or"
    Not, // "not"

    // 字面量
    /// FIELD、NAME 和运算符关键字共用标识符语法，
    /// 由语法分析器根据位置决定具体是哪一种
    Identifier(&'a str),
    String(&'a str), // The raw string, including quotes
    Number(&'a str), // The raw literal, converted at reduction

    // 标点符号
    Colon, // :
    Comma, // ,

    // 特殊
    Illegal, // An illegal/unknown character or an unterminated string
}

impl TokenKind<'_> {
    /// 用于语法错误信息的简短描述
    pub fn describe(&self) -> String {
        match self {
            TokenKind::And => "keyword `and`".to_string(),
            TokenKind::Or => "keyword `or`".to_string(),
            TokenKind::Not => "keyword `not`".to_string(),
            TokenKind::Identifier(s) => format!("name `{}`", s),
            TokenKind::String(s) => format!("string {}", s),
            TokenKind::Number(s) => format!("number `{}`", s),
            TokenKind::Colon => "`:`".to_string(),
            TokenKind::Comma => "`,`".to_string(),
            TokenKind::Illegal => "illegal input".to_string(),
        }
    }
}

/// 表示源文本中的一个区间
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Span {
    /// 起始字节偏移
    pub start: usize,
    /// 结束字节偏移
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }
}
