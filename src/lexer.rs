//! 过滤语言的词法分析器
//!
//! Token 类别：
//!
//! ```text
//! IDENT   [A-Za-z_][A-Za-z0-9_]*        (and / or / not become keywords)
//! STRING  "..."                          (backslash keeps the next char, no unescaping)
//! NUMBER  unsigned int, decimal or float with optional exponent
//! ":"  ","
//! ```
//!
//! 空白字符只用于分隔 token，其余情况下忽略。

use crate::token::{Span, Token, TokenKind};

pub struct Lexer<'a> {
    input: &'a str,
    /// 输入字符串中的当前位置（字节索引）
    position: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Lexer { input, position: 0 }
    }

    /// 返回当前位置的字符，不推进位置
    fn peek(&self) -> Option<char> {
        self.input[self.position..].chars().next()
    }

    /// 推进位置一个字符并返回该字符
    fn bump(&mut self) -> Option<char> {
        let c = self.peek();
        if let Some(c) = c {
            self.position += c.len_utf8();
        }
        c
    }

    fn skip_whitespace(&mut self) {
        while let Some(c) = self.peek() {
            if c.is_whitespace() {
                self.bump();
            } else {
                break;
            }
        }
    }

    fn eat_digits(&mut self) -> usize {
        let mut count = 0;
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() {
                self.bump();
                count += 1;
            } else {
                break;
            }
        }
        count
    }

    /// 读取数字字面量。第一个字符（数字或 '.'）已经被消费
    fn read_number(&mut self, start: usize, first: char) -> Token<'a> {
        if first == '.' {
            self.eat_digits();
        } else {
            self.eat_digits();
            if self.peek() == Some('.') {
                self.bump();
                self.eat_digits();
            }
        }

        // 只有后面跟着数字时才算指数，否则 `e` 属于下一个 token
        if matches!(self.peek(), Some('e' | 'E')) {
            let checkpoint = self.position;
            self.bump();
            if matches!(self.peek(), Some('+' | '-')) {
                self.bump();
            }
            if self.eat_digits() == 0 {
                self.position = checkpoint;
            }
        }

        Token {
            kind: TokenKind::Number(&self.input[start..self.position]),
            span: Span::new(start, self.position),
        }
    }

    /// 读取双引号包围的字符串字面量
    /// 注意：开始的引号已经被调用者消费；token 保留两端引号，去除引号在归约时进行
    fn read_string(&mut self, start: usize) -> Token<'a> {
        loop {
            match self.bump() {
                Some('"') => {
                    return Token {
                        kind: TokenKind::String(&self.input[start..self.position]),
                        span: Span::new(start, self.position),
                    };
                }
                Some('\\') => {
                    self.bump();
                }
                Some(_) => {}
                None => {
                    return Token {
                        kind: TokenKind::Illegal,
                        span: Span::new(start, self.position),
                    };
                }
            }
        }
    }

    fn read_identifier(&mut self, start: usize) -> Token<'a> {
        while let Some(c) = self.peek() {
            if c.is_ascii_alphanumeric() || c == '_' {
                self.bump();
            } else {
                break;
            }
        }
        let literal = &self.input[start..self.position];
        Token {
            kind: match_keyword(literal),
            span: Span::new(start, self.position),
        }
    }
}

fn match_keyword(s: &str) -> TokenKind<'_> {
    match s {
        "and" => TokenKind::And,
        "or" => TokenKind::Or,
        "not" => TokenKind::Not,
        _ => TokenKind::Identifier(s),
    }
}

impl<'a> Iterator for Lexer<'a> {
    type Item = Token<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        self.skip_whitespace();
        let start = self.position;

        let c = self.bump()?;

        let token = match c {
            ':' => Token { kind: TokenKind::Colon, span: Span::new(start, self.position) },
            ',' => Token { kind: TokenKind::Comma, span: Span::new(start, self.position) },
            '"' => self.read_string(start),
            c if c.is_ascii_digit() => self.read_number(start, c),
            '.' if self.peek().is_some_and(|n| n.is_ascii_digit()) => self.read_number(start, '.'),
            c if c.is_ascii_alphabetic() || c == '_' => self.read_identifier(start),
            _ => Token { kind: TokenKind::Illegal, span: Span::new(start, self.position) },
        };
        Some(token)
    }
}
