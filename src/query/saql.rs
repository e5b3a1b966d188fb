//! SAQL, the analytics pipeline language: `q = load "ds"; q = filter q by ...;`.
//!
//! Each statement assigns a stream variable from `load` or from a step over
//! an earlier variable. Supported steps: `filter`, `foreach ... generate`,
//! `group ... by`, `order ... by` and `limit`.

use super::ast::{CompareOp, SortDirection};
use crate::core::{MockError, Result, Value};

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    /// `'Field'`
    Field(String),
    /// `"text"`
    Str(String),
    Number(String),
    Op(&'static str),
    Assign,
    Semicolon,
    Comma,
    LParen,
    RParen,
    AndAnd,
}

impl Token {
    fn is_keyword(&self, keyword: &str) -> bool {
        matches!(self, Token::Ident(w) if w.eq_ignore_ascii_case(keyword))
    }

    fn describe(&self) -> String {
        match self {
            Token::Ident(w) | Token::Number(w) => w.clone(),
            Token::Field(f) => format!("'{}'", f),
            Token::Str(s) => format!("\"{}\"", s),
            Token::Op(op) => op.to_string(),
            Token::Assign => "=".into(),
            Token::Semicolon => ";".into(),
            Token::Comma => ",".into(),
            Token::LParen => "(".into(),
            Token::RParen => ")".into(),
            Token::AndAnd => "&&".into(),
        }
    }
}

fn tokenize(input: &str) -> Result<Vec<Token>> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let next = chars.get(i + 1).copied();
        match c {
            c if c.is_whitespace() => i += 1,
            ';' => {
                tokens.push(Token::Semicolon);
                i += 1;
            }
            ',' => {
                tokens.push(Token::Comma);
                i += 1;
            }
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '\'' | '"' => {
                let (text, end) = read_quoted(&chars, i + 1, c)?;
                tokens.push(if c == '\'' { Token::Field(text) } else { Token::Str(text) });
                i = end;
            }
            '&' if next == Some('&') => {
                tokens.push(Token::AndAnd);
                i += 2;
            }
            '=' if next == Some('=') => {
                tokens.push(Token::Op("=="));
                i += 2;
            }
            '=' => {
                tokens.push(Token::Assign);
                i += 1;
            }
            '!' if next == Some('=') => {
                tokens.push(Token::Op("!="));
                i += 2;
            }
            '<' | '>' => {
                let op = match (c, next) {
                    ('<', Some('=')) => "<=",
                    ('>', Some('=')) => ">=",
                    ('<', _) => "<",
                    _ => ">",
                };
                tokens.push(Token::Op(op));
                i += op.len();
            }
            c if c.is_ascii_digit() || (c == '-' && next.is_some_and(|n| n.is_ascii_digit())) => {
                let start = i;
                i += 1;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                tokens.push(Token::Number(chars[start..i].iter().collect()));
            }
            c if c.is_alphanumeric() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                tokens.push(Token::Ident(chars[start..i].iter().collect()));
            }
            other => {
                return Err(MockError::MalformedQuery(format!(
                    "unexpected character '{}' at position {}",
                    other, i
                )));
            }
        }
    }
    Ok(tokens)
}

fn read_quoted(chars: &[char], mut i: usize, quote: char) -> Result<(String, usize)> {
    let mut text = String::new();
    while i < chars.len() {
        match chars[i] {
            '\\' if i + 1 < chars.len() => {
                text.push(chars[i + 1]);
                i += 2;
            }
            c if c == quote => return Ok((text, i + 1)),
            c => {
                text.push(c);
                i += 1;
            }
        }
    }
    Err(MockError::MalformedQuery(format!("unterminated {} literal", quote)))
}

/// One `'field' <op> literal` test inside `filter ... by`.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterCondition {
    pub field: String,
    pub op: CompareOp,
    pub value: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Aggregate {
    Count,
    Sum,
    Avg,
    Min,
    Max,
}

impl Aggregate {
    fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "count" => Some(Self::Count),
            "sum" => Some(Self::Sum),
            "avg" | "average" => Some(Self::Avg),
            "min" => Some(Self::Min),
            "max" => Some(Self::Max),
            _ => None,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Self::Count => "count",
            Self::Sum => "sum",
            Self::Avg => "avg",
            Self::Min => "min",
            Self::Max => "max",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Projection {
    Field(String),
    /// `count()` carries no field.
    Aggregate(Aggregate, Option<String>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct GenerateItem {
    pub projection: Projection,
    pub alias: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    /// Conditions joined by `&&` / `and`.
    Filter(Vec<FilterCondition>),
    Foreach(Vec<GenerateItem>),
    /// Empty for `group ... by all`.
    Group(Vec<String>),
    Order(Vec<(String, SortDirection)>),
    Limit(usize),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SaqlQuery {
    /// Dataset reference from the `load` statement: id, `id/version` or name.
    pub dataset: String,
    /// Steps in statement order.
    pub steps: Vec<Step>,
}

struct SaqlParser {
    tokens: Vec<Token>,
    pos: usize,
    streams: Vec<String>,
}

impl SaqlParser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.peek() == Some(token) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn eat_keyword(&mut self, keyword: &str) -> bool {
        if self.peek().is_some_and(|t| t.is_keyword(keyword)) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: Token) -> Result<()> {
        if self.eat(&token) {
            Ok(())
        } else {
            Err(self.unexpected(&format!("'{}'", token.describe())))
        }
    }

    fn expect_keyword(&mut self, keyword: &str) -> Result<()> {
        if self.eat_keyword(keyword) {
            Ok(())
        } else {
            Err(self.unexpected(keyword))
        }
    }

    fn unexpected(&self, expected: &str) -> MockError {
        expected_found(expected, self.peek())
    }

    fn expect_ident(&mut self, what: &str) -> Result<String> {
        match self.peek() {
            Some(Token::Ident(w)) => {
                let w = w.clone();
                self.pos += 1;
                Ok(w)
            }
            _ => Err(self.unexpected(what)),
        }
    }

    fn expect_field(&mut self) -> Result<String> {
        match self.peek() {
            Some(Token::Field(f)) => {
                let f = f.clone();
                self.pos += 1;
                Ok(f)
            }
            _ => Err(self.unexpected("a quoted field name")),
        }
    }

    /// A stream variable that an earlier statement assigned.
    fn expect_stream(&mut self) -> Result<()> {
        let name = self.expect_ident("a stream name")?;
        if self.streams.iter().any(|s| *s == name) {
            Ok(())
        } else {
            Err(MockError::MalformedQuery(format!("undefined stream '{}'", name)))
        }
    }

    fn parse(mut self) -> Result<SaqlQuery> {
        let mut dataset = None;
        let mut steps = Vec::new();

        while self.peek().is_some() {
            let target = self.expect_ident("a stream name")?;
            self.expect(Token::Assign)?;
            let verb = self.expect_ident("load, filter, foreach, group, order or limit")?;

            match verb.to_ascii_lowercase().as_str() {
                "load" => {
                    if dataset.is_some() {
                        return Err(MockError::MalformedQuery(
                            "only one load statement is supported".into(),
                        ));
                    }
                    match self.advance() {
                        Some(Token::Str(reference)) => dataset = Some(reference),
                        _ => {
                            return Err(MockError::MalformedQuery(
                                "load expects a double-quoted dataset reference".into(),
                            ));
                        }
                    }
                }
                _ if dataset.is_none() => {
                    return Err(MockError::MalformedQuery(
                        "SAQL must start with a load statement: q = load \"datasetRef\"".into(),
                    ));
                }
                "filter" => {
                    self.expect_stream()?;
                    self.expect_keyword("by")?;
                    steps.push(Step::Filter(self.parse_conditions()?));
                }
                "foreach" => {
                    self.expect_stream()?;
                    self.expect_keyword("generate")?;
                    steps.push(Step::Foreach(self.parse_generate()?));
                }
                "group" => {
                    self.expect_stream()?;
                    self.expect_keyword("by")?;
                    steps.push(Step::Group(self.parse_group_keys()?));
                }
                "order" => {
                    self.expect_stream()?;
                    self.expect_keyword("by")?;
                    steps.push(Step::Order(self.parse_order()?));
                }
                "limit" => {
                    self.expect_stream()?;
                    let count = match self.advance() {
                        Some(Token::Number(n)) => n.parse::<usize>().ok(),
                        _ => None,
                    };
                    let count = count.ok_or_else(|| {
                        MockError::MalformedQuery("limit expects a non-negative integer".into())
                    })?;
                    steps.push(Step::Limit(count));
                }
                other => {
                    return Err(MockError::MalformedQuery(format!(
                        "unsupported SAQL statement '{}'",
                        other
                    )));
                }
            }

            if !self.streams.contains(&target) {
                self.streams.push(target);
            }
            // The last statement may omit its semicolon.
            if !self.eat(&Token::Semicolon) && self.peek().is_some() {
                return Err(self.unexpected("';'"));
            }
        }

        let dataset = dataset.ok_or_else(|| {
            MockError::MalformedQuery(
                "SAQL must contain a load statement: q = load \"datasetRef\"".into(),
            )
        })?;
        Ok(SaqlQuery { dataset, steps })
    }

    fn parse_conditions(&mut self) -> Result<Vec<FilterCondition>> {
        let mut conditions = vec![self.parse_condition()?];
        while self.eat(&Token::AndAnd) || self.eat_keyword("and") {
            conditions.push(self.parse_condition()?);
        }
        Ok(conditions)
    }

    fn parse_condition(&mut self) -> Result<FilterCondition> {
        let field = self.expect_field()?;
        let op = match self.advance() {
            Some(Token::Op("==")) => CompareOp::Eq,
            Some(Token::Op("!=")) => CompareOp::NotEq,
            Some(Token::Op(">")) => CompareOp::Gt,
            Some(Token::Op(">=")) => CompareOp::GtEq,
            Some(Token::Op("<")) => CompareOp::Lt,
            Some(Token::Op("<=")) => CompareOp::LtEq,
            other => return Err(expected_found("a comparison operator", other.as_ref())),
        };
        let value = match self.advance() {
            Some(Token::Str(s)) | Some(Token::Field(s)) => Value::Text(s),
            Some(Token::Number(n)) => parse_number(&n)?,
            other => return Err(expected_found("a literal", other.as_ref())),
        };
        Ok(FilterCondition { field, op, value })
    }

    fn parse_generate(&mut self) -> Result<Vec<GenerateItem>> {
        let mut items = vec![self.parse_generate_item()?];
        while self.eat(&Token::Comma) {
            items.push(self.parse_generate_item()?);
        }
        Ok(items)
    }

    fn parse_generate_item(&mut self) -> Result<GenerateItem> {
        let projection = match self.advance() {
            Some(Token::Field(field)) => Projection::Field(field),
            Some(Token::Ident(name)) => {
                let aggregate = Aggregate::parse(&name).ok_or_else(|| {
                    MockError::MalformedQuery(format!("unknown function '{}'", name))
                })?;
                self.expect(Token::LParen)?;
                let field = match self.peek() {
                    Some(Token::RParen) => None,
                    _ => Some(self.expect_field()?),
                };
                self.expect(Token::RParen)?;
                if field.is_none() && aggregate != Aggregate::Count {
                    return Err(MockError::MalformedQuery(format!(
                        "{}() needs a field",
                        aggregate.name()
                    )));
                }
                Projection::Aggregate(aggregate, field)
            }
            other => return Err(expected_found("a field or aggregate", other.as_ref())),
        };

        let alias = if self.eat_keyword("as") {
            match self.advance() {
                Some(Token::Field(alias)) | Some(Token::Str(alias)) | Some(Token::Ident(alias)) => alias,
                _ => return Err(MockError::MalformedQuery("as expects an alias".into())),
            }
        } else {
            match &projection {
                Projection::Field(field) => field.clone(),
                Projection::Aggregate(aggregate, None) => aggregate.name().to_string(),
                Projection::Aggregate(aggregate, Some(field)) => {
                    format!("{}_{}", aggregate.name(), field)
                }
            }
        };
        Ok(GenerateItem { projection, alias })
    }

    fn parse_group_keys(&mut self) -> Result<Vec<String>> {
        if self.eat_keyword("all") {
            return Ok(Vec::new());
        }
        if self.eat(&Token::LParen) {
            let mut keys = vec![self.expect_field()?];
            while self.eat(&Token::Comma) {
                keys.push(self.expect_field()?);
            }
            self.expect(Token::RParen)?;
            return Ok(keys);
        }
        Ok(vec![self.expect_field()?])
    }

    fn parse_order(&mut self) -> Result<Vec<(String, SortDirection)>> {
        if self.eat(&Token::LParen) {
            let mut keys = vec![self.parse_order_key()?];
            while self.eat(&Token::Comma) {
                keys.push(self.parse_order_key()?);
            }
            self.expect(Token::RParen)?;
            return Ok(keys);
        }
        Ok(vec![self.parse_order_key()?])
    }

    fn parse_order_key(&mut self) -> Result<(String, SortDirection)> {
        let field = self.expect_field()?;
        let direction = if self.eat_keyword("desc") {
            SortDirection::Desc
        } else {
            self.eat_keyword("asc");
            SortDirection::Asc
        };
        Ok((field, direction))
    }
}

fn expected_found(expected: &str, found: Option<&Token>) -> MockError {
    let found = found
        .map(|t| format!("'{}'", t.describe()))
        .unwrap_or_else(|| "end of query".to_string());
    MockError::MalformedQuery(format!("expected {}, found {}", expected, found))
}

fn parse_number(text: &str) -> Result<Value> {
    let parsed = if text.contains('.') {
        text.parse::<f64>().ok().map(Value::Float)
    } else {
        text.parse::<i64>().ok().map(Value::Integer)
    };
    parsed.ok_or_else(|| MockError::MalformedQuery(format!("invalid number '{}'", text)))
}

pub fn parse_saql(input: &str) -> Result<SaqlQuery> {
    let tokens = tokenize(input)?;
    SaqlParser {
        tokens,
        pos: 0,
        streams: Vec::new(),
    }
    .parse()
}
