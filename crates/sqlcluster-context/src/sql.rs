//! Lexer and parser for the `SELECT` subset served by [`MemoryContext`]
//!
//! ```text
//! SELECT * | col [, col]... FROM table
//!     [WHERE col op literal [AND col op literal]...]
//!     [LIMIT n] [;]
//! ```
//!
//! [`MemoryContext`]: crate::memory::MemoryContext

use sqlcluster_core::{QueryError, Result};
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    // Keywords
    Select,
    From,
    Where,
    And,
    Limit,
    True,
    False,

    // Operators
    Star,
    Minus,
    Equal,
    NotEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,

    // Delimiters
    Comma,
    Semicolon,

    // Literals
    Number(String),
    String(String),
    Identifier(String),

    Eof,
}

pub struct Lexer {
    input: Vec<char>,
    position: usize,
}

impl Lexer {
    pub fn new(input: &str) -> Self {
        Self {
            input: input.chars().collect(),
            position: 0,
        }
    }

    pub fn tokenize(&mut self) -> Result<Vec<Token>> {
        let mut tokens = Vec::new();

        loop {
            self.skip_whitespace();
            if self.position >= self.input.len() {
                break;
            }
            tokens.push(self.next_token()?);
        }

        tokens.push(Token::Eof);
        Ok(tokens)
    }

    fn next_token(&mut self) -> Result<Token> {
        let ch = self.current_char();

        let token = match ch {
            '*' => {
                self.advance();
                Token::Star
            }
            '-' => {
                self.advance();
                Token::Minus
            }
            '=' => {
                self.advance();
                Token::Equal
            }
            '<' => {
                self.advance();
                match self.current_char() {
                    '=' => {
                        self.advance();
                        Token::LessEqual
                    }
                    '>' => {
                        self.advance();
                        Token::NotEqual
                    }
                    _ => Token::Less,
                }
            }
            '>' => {
                self.advance();
                if self.current_char() == '=' {
                    self.advance();
                    Token::GreaterEqual
                } else {
                    Token::Greater
                }
            }
            '!' => {
                self.advance();
                if self.current_char() != '=' {
                    return Err(QueryError::ParseError(
                        "Unexpected character '!'".to_string(),
                    ));
                }
                self.advance();
                Token::NotEqual
            }
            ',' => {
                self.advance();
                Token::Comma
            }
            ';' => {
                self.advance();
                Token::Semicolon
            }
            '\'' => self.read_string()?,
            '"' => self.read_quoted_identifier()?,
            _ if ch.is_ascii_digit() || ch == '.' => self.read_number(),
            _ if ch.is_alphabetic() || ch == '_' => self.read_identifier(),
            _ => {
                return Err(QueryError::ParseError(format!(
                    "Unexpected character: '{}'",
                    ch
                )));
            }
        };

        Ok(token)
    }

    fn read_string(&mut self) -> Result<Token> {
        self.advance();
        let mut value = String::new();

        loop {
            if self.position >= self.input.len() {
                return Err(QueryError::ParseError("Unterminated string".to_string()));
            }
            let ch = self.current_char();
            self.advance();
            if ch == '\'' {
                // '' is an escaped quote
                if self.current_char() == '\'' {
                    value.push('\'');
                    self.advance();
                    continue;
                }
                break;
            }
            value.push(ch);
        }

        Ok(Token::String(value))
    }

    fn read_quoted_identifier(&mut self) -> Result<Token> {
        self.advance();
        let mut ident = String::new();

        while self.position < self.input.len() && self.current_char() != '"' {
            ident.push(self.current_char());
            self.advance();
        }
        if self.position >= self.input.len() {
            return Err(QueryError::ParseError(
                "Unterminated quoted identifier".to_string(),
            ));
        }
        self.advance();

        Ok(Token::Identifier(ident))
    }

    fn read_number(&mut self) -> Token {
        let mut number = String::new();

        while self.position < self.input.len()
            && (self.current_char().is_ascii_digit() || self.current_char() == '.')
        {
            number.push(self.current_char());
            self.advance();
        }

        Token::Number(number)
    }

    fn read_identifier(&mut self) -> Token {
        let mut ident = String::new();

        while self.position < self.input.len()
            && (self.current_char().is_alphanumeric() || self.current_char() == '_')
        {
            ident.push(self.current_char());
            self.advance();
        }

        match ident.to_uppercase().as_str() {
            "SELECT" => Token::Select,
            "FROM" => Token::From,
            "WHERE" => Token::Where,
            "AND" => Token::And,
            "LIMIT" => Token::Limit,
            "TRUE" => Token::True,
            "FALSE" => Token::False,
            _ => Token::Identifier(ident),
        }
    }

    fn current_char(&self) -> char {
        self.input.get(self.position).copied().unwrap_or('\0')
    }

    fn advance(&mut self) {
        self.position += 1;
    }

    fn skip_whitespace(&mut self) {
        while self.position < self.input.len() && self.current_char().is_whitespace() {
            self.advance();
        }
    }
}

/// Comparison operators allowed in `WHERE`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = match self {
            CompareOp::Eq => "=",
            CompareOp::NotEq => "!=",
            CompareOp::Lt => "<",
            CompareOp::LtEq => "<=",
            CompareOp::Gt => ">",
            CompareOp::GtEq => ">=",
        };
        write!(f, "{}", symbol)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Integer(i64),
    Float(f64),
    String(String),
    Boolean(bool),
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Integer(v) => write!(f, "{}", v),
            Literal::Float(v) => write!(f, "{}", v),
            Literal::String(v) => write!(f, "'{}'", v.replace('\'', "''")),
            Literal::Boolean(v) => write!(f, "{}", v),
        }
    }
}

/// `column op literal`
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    pub column: String,
    pub op: CompareOp,
    pub value: Literal,
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.column, self.op, self.value)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Projection {
    Wildcard,
    Columns(Vec<String>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SelectQuery {
    pub projection: Projection,
    pub table: String,
    /// Conjunction of predicates
    pub selection: Vec<Predicate>,
    pub limit: Option<usize>,
}

pub struct Parser {
    tokens: Vec<Token>,
    position: usize,
}

impl Parser {
    pub fn new(sql: &str) -> Result<Self> {
        let tokens = Lexer::new(sql).tokenize()?;
        Ok(Self {
            tokens,
            position: 0,
        })
    }

    pub fn parse(&mut self) -> Result<SelectQuery> {
        self.expect_token(&Token::Select)?;
        let projection = self.parse_projection()?;

        self.expect_token(&Token::From)?;
        let table = self.parse_identifier()?;

        let mut selection = Vec::new();
        if self.match_token(&Token::Where) {
            loop {
                selection.push(self.parse_predicate()?);
                if !self.match_token(&Token::And) {
                    break;
                }
            }
        }

        let limit = if self.match_token(&Token::Limit) {
            Some(self.parse_limit()?)
        } else {
            None
        };

        self.match_token(&Token::Semicolon);
        if self.current_token() != &Token::Eof {
            return Err(QueryError::ParseError(format!(
                "Unexpected token after query: {:?}",
                self.current_token()
            )));
        }

        Ok(SelectQuery {
            projection,
            table,
            selection,
            limit,
        })
    }

    fn parse_projection(&mut self) -> Result<Projection> {
        if self.match_token(&Token::Star) {
            return Ok(Projection::Wildcard);
        }

        let mut columns = vec![self.parse_identifier()?];
        while self.match_token(&Token::Comma) {
            columns.push(self.parse_identifier()?);
        }
        Ok(Projection::Columns(columns))
    }

    fn parse_predicate(&mut self) -> Result<Predicate> {
        let column = self.parse_identifier()?;

        let op = match self.current_token() {
            Token::Equal => CompareOp::Eq,
            Token::NotEqual => CompareOp::NotEq,
            Token::Less => CompareOp::Lt,
            Token::LessEqual => CompareOp::LtEq,
            Token::Greater => CompareOp::Gt,
            Token::GreaterEqual => CompareOp::GtEq,
            other => {
                return Err(QueryError::ParseError(format!(
                    "Expected comparison operator, found {:?}",
                    other
                )))
            }
        };
        self.advance();

        let value = self.parse_literal()?;
        Ok(Predicate { column, op, value })
    }

    fn parse_literal(&mut self) -> Result<Literal> {
        let negative = self.match_token(&Token::Minus);

        let literal = match self.current_token().clone() {
            Token::Number(text) => {
                let text = if negative { format!("-{}", text) } else { text };
                if text.contains('.') {
                    Literal::Float(text.parse().map_err(|_| {
                        QueryError::ParseError(format!("Invalid number: {}", text))
                    })?)
                } else {
                    Literal::Integer(text.parse().map_err(|_| {
                        QueryError::ParseError(format!("Invalid number: {}", text))
                    })?)
                }
            }
            Token::String(s) if !negative => Literal::String(s),
            Token::True if !negative => Literal::Boolean(true),
            Token::False if !negative => Literal::Boolean(false),
            other => {
                return Err(QueryError::ParseError(format!(
                    "Expected literal, found {:?}",
                    other
                )))
            }
        };
        self.advance();

        Ok(literal)
    }

    fn parse_limit(&mut self) -> Result<usize> {
        match self.current_token().clone() {
            Token::Number(text) => {
                self.advance();
                text.parse()
                    .map_err(|_| QueryError::ParseError(format!("Invalid LIMIT: {}", text)))
            }
            other => Err(QueryError::ParseError(format!(
                "Expected number after LIMIT, found {:?}",
                other
            ))),
        }
    }

    fn parse_identifier(&mut self) -> Result<String> {
        match self.current_token().clone() {
            Token::Identifier(name) => {
                self.advance();
                Ok(name)
            }
            other => Err(QueryError::ParseError(format!(
                "Expected identifier, found {:?}",
                other
            ))),
        }
    }

    fn current_token(&self) -> &Token {
        self.tokens.get(self.position).unwrap_or(&Token::Eof)
    }

    fn advance(&mut self) {
        if self.position < self.tokens.len() {
            self.position += 1;
        }
    }

    fn match_token(&mut self, token: &Token) -> bool {
        if self.current_token() == token {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect_token(&mut self, token: &Token) -> Result<()> {
        if self.match_token(token) {
            Ok(())
        } else {
            Err(QueryError::ParseError(format!(
                "Expected {:?}, found {:?}",
                token,
                self.current_token()
            )))
        }
    }
}

/// Parse one query of the supported subset
pub fn parse_query(sql: &str) -> Result<SelectQuery> {
    Parser::new(sql)?.parse()
}
