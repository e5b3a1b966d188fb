use super::ast::{
    CompareOp, Condition, Logical, NullsPosition, Operand, OrderBy, SelectList, SoqlQuery,
    SortDirection, WhereClause,
};
use super::lexer::{Token, tokenize};
use crate::core::{MockError, Result, Value};

/// Which condition forms a WHERE clause may use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WhereDialect {
    /// SOQL: comparisons, LIKE, IN and NOT IN.
    Full,
    /// SOSL RETURNING: comparisons only.
    Comparisons,
}

/// Recursive-descent cursor over a token stream, shared by the SOQL and SOSL parsers.
pub(crate) struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    pub(crate) fn new(tokens: Vec<Token>) -> Self {
        Self { tokens, pos: 0 }
    }

    pub(crate) fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    pub(crate) fn peek_at(&self, offset: usize) -> Option<&Token> {
        self.tokens.get(self.pos + offset)
    }

    pub(crate) fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    pub(crate) fn peek_keyword(&self, keyword: &str) -> bool {
        self.peek().is_some_and(|t| t.is_keyword(keyword))
    }

    pub(crate) fn eat_keyword(&mut self, keyword: &str) -> bool {
        if self.peek_keyword(keyword) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    pub(crate) fn eat(&mut self, token: &Token) -> bool {
        if self.peek() == Some(token) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    pub(crate) fn expect(&mut self, token: Token) -> Result<()> {
        if self.eat(&token) {
            Ok(())
        } else {
            Err(self.unexpected(&format!("'{}'", token.describe())))
        }
    }

    pub(crate) fn expect_keyword(&mut self, keyword: &str) -> Result<()> {
        if self.eat_keyword(keyword) {
            Ok(())
        } else {
            Err(self.unexpected(keyword))
        }
    }

    /// An identifier: letters, digits, `_` and `.` for relationship paths.
    pub(crate) fn expect_identifier(&mut self, what: &str) -> Result<String> {
        match self.peek() {
            Some(Token::Word(w)) if is_identifier(w) => {
                let w = w.clone();
                self.pos += 1;
                Ok(w)
            }
            _ => Err(self.unexpected(what)),
        }
    }

    pub(crate) fn expect_count(&mut self, clause: &str) -> Result<usize> {
        match self.advance() {
            Some(Token::Word(w)) => w.parse::<usize>().map_err(|_| {
                MockError::MalformedQuery(format!("{} expects a non-negative integer, found '{}'", clause, w))
            }),
            other => Err(MockError::MalformedQuery(format!(
                "{} expects a non-negative integer, found {}",
                clause,
                describe(other.as_ref())
            ))),
        }
    }

    pub(crate) fn expect_end(&self) -> Result<()> {
        match self.peek() {
            None => Ok(()),
            Some(token) => Err(MockError::MalformedQuery(format!(
                "unexpected token '{}'",
                token.describe()
            ))),
        }
    }

    pub(crate) fn unexpected(&self, expected: &str) -> MockError {
        MockError::MalformedQuery(format!(
            "expected {}, found {}",
            expected,
            describe(self.peek())
        ))
    }

    pub(crate) fn parse_where(&mut self, dialect: WhereDialect) -> Result<WhereClause> {
        let first = self.parse_condition(dialect)?;
        let mut rest = Vec::new();
        loop {
            let logical = if self.eat_keyword("AND") {
                Logical::And
            } else if self.eat_keyword("OR") {
                Logical::Or
            } else {
                break;
            };
            rest.push((logical, self.parse_condition(dialect)?));
        }
        Ok(WhereClause { first, rest })
    }

    fn parse_condition(&mut self, dialect: WhereDialect) -> Result<Condition> {
        let field = self.expect_identifier("field name in condition")?;

        if let Some(Token::Op(symbol)) = self.peek() {
            let op = CompareOp::from_symbol(symbol)
                .ok_or_else(|| MockError::MalformedQuery(format!("unknown operator '{}'", symbol)))?;
            self.pos += 1;
            let value = self.parse_literal()?;
            return Ok(Condition {
                field,
                op,
                operand: Operand::Value(value),
            });
        }

        if dialect == WhereDialect::Full {
            if self.eat_keyword("LIKE") {
                return match self.advance() {
                    Some(Token::Str(pattern)) => Ok(Condition {
                        field,
                        op: CompareOp::Like,
                        operand: Operand::Value(Value::Text(pattern)),
                    }),
                    other => Err(MockError::MalformedQuery(format!(
                        "LIKE expects a quoted pattern, found {}",
                        describe(other.as_ref())
                    ))),
                };
            }
            if self.eat_keyword("IN") {
                let members = self.parse_list()?;
                return Ok(Condition {
                    field,
                    op: CompareOp::In,
                    operand: Operand::List(members),
                });
            }
            if self.peek_keyword("NOT") && self.peek_at(1).is_some_and(|t| t.is_keyword("IN")) {
                self.pos += 2;
                let members = self.parse_list()?;
                return Ok(Condition {
                    field,
                    op: CompareOp::NotIn,
                    operand: Operand::List(members),
                });
            }
        }

        Err(self.unexpected(&format!("operator after '{}'", field)))
    }

    fn parse_literal(&mut self) -> Result<Value> {
        match self.advance() {
            Some(Token::Str(s)) => Ok(Value::Text(s)),
            Some(Token::Word(w)) => Ok(word_literal(&w)),
            other => Err(MockError::MalformedQuery(format!(
                "expected a value, found {}",
                describe(other.as_ref())
            ))),
        }
    }

    fn parse_list(&mut self) -> Result<Vec<String>> {
        self.expect(Token::LParen)?;
        let mut members = Vec::new();
        loop {
            match self.advance() {
                Some(Token::Str(s)) | Some(Token::Word(s)) => members.push(s),
                other => {
                    return Err(MockError::MalformedQuery(format!(
                        "expected a list value, found {}",
                        describe(other.as_ref())
                    )));
                }
            }
            if self.eat(&Token::Comma) {
                continue;
            }
            self.expect(Token::RParen)?;
            return Ok(members);
        }
    }
}

fn describe(token: Option<&Token>) -> String {
    match token {
        Some(token) => format!("'{}'", token.describe()),
        None => "end of query".to_string(),
    }
}

fn is_identifier(word: &str) -> bool {
    !word.is_empty()
        && word
            .chars()
            .all(|c| c.is_alphanumeric() || c == '_' || c == '.')
}

/// Unquoted literal: boolean, null, integer, float, otherwise the raw word.
fn word_literal(word: &str) -> Value {
    if word.eq_ignore_ascii_case("true") {
        return Value::Boolean(true);
    }
    if word.eq_ignore_ascii_case("false") {
        return Value::Boolean(false);
    }
    if word.eq_ignore_ascii_case("null") {
        return Value::Null;
    }
    if let Ok(i) = word.parse::<i64>() {
        return Value::Integer(i);
    }
    if word.chars().any(|c| c.is_ascii_digit())
        && let Ok(f) = word.parse::<f64>()
    {
        return Value::Float(f);
    }
    Value::Text(word.to_string())
}

/// Parse `SELECT <fields|COUNT()> FROM <Object> [WHERE ...] [ORDER BY ...] [LIMIT n] [OFFSET n]`.
pub fn parse_soql(text: &str) -> Result<SoqlQuery> {
    if text.trim().is_empty() {
        return Err(MockError::MalformedQuery("SOQL query is required".into()));
    }
    let mut p = Parser::new(tokenize(text)?);

    p.expect_keyword("SELECT")?;
    let select = if p.peek_keyword("COUNT") && p.peek_at(1) == Some(&Token::LParen) {
        p.advance();
        p.expect(Token::LParen)?;
        p.expect(Token::RParen)?;
        SelectList::Count
    } else {
        SelectList::Fields(parse_field_list(&mut p)?)
    };

    p.expect_keyword("FROM")?;
    let object = p.expect_identifier("object name after FROM")?;

    let filter = if p.eat_keyword("WHERE") {
        Some(p.parse_where(WhereDialect::Full)?)
    } else {
        None
    };

    let order_by = if p.eat_keyword("ORDER") {
        p.expect_keyword("BY")?;
        Some(parse_order_by(&mut p)?)
    } else {
        None
    };

    let mut limit = None;
    let mut offset = None;
    loop {
        if p.eat_keyword("LIMIT") {
            if limit.is_some() {
                return Err(MockError::MalformedQuery("duplicate LIMIT clause".into()));
            }
            limit = Some(p.expect_count("LIMIT")?);
        } else if p.eat_keyword("OFFSET") {
            if offset.is_some() {
                return Err(MockError::MalformedQuery("duplicate OFFSET clause".into()));
            }
            offset = Some(p.expect_count("OFFSET")?);
        } else {
            break;
        }
    }

    p.expect_end()?;

    Ok(SoqlQuery {
        select,
        object,
        filter,
        order_by,
        limit,
        offset,
    })
}

fn parse_field_list(p: &mut Parser) -> Result<Vec<String>> {
    let mut fields = Vec::new();
    loop {
        if p.eat(&Token::Star) {
            fields.push("*".to_string());
        } else if p.peek_keyword("FROM") {
            return Err(p.unexpected("field name"));
        } else {
            fields.push(p.expect_identifier("field name")?);
        }
        if !p.eat(&Token::Comma) {
            return Ok(fields);
        }
    }
}

fn parse_order_by(p: &mut Parser) -> Result<OrderBy> {
    let field = p.expect_identifier("field name after ORDER BY")?;
    let direction = if p.eat_keyword("DESC") {
        SortDirection::Desc
    } else {
        p.eat_keyword("ASC");
        SortDirection::Asc
    };
    let nulls = if p.eat_keyword("NULLS") {
        if p.eat_keyword("FIRST") {
            NullsPosition::First
        } else if p.eat_keyword("LAST") {
            NullsPosition::Last
        } else {
            return Err(p.unexpected("FIRST or LAST after NULLS"));
        }
    } else {
        NullsPosition::Last
    };
    Ok(OrderBy {
        field,
        direction,
        nulls,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_query() {
        let q = parse_soql(
            "SELECT Id, Name FROM Account WHERE Industry = 'Tech' AND AnnualRevenue > 1000.5 \
             ORDER BY Name DESC NULLS FIRST LIMIT 10 OFFSET 5",
        )
        .unwrap();

        assert_eq!(q.select, SelectList::Fields(vec!["Id".into(), "Name".into()]));
        assert_eq!(q.object, "Account");
        let filter = q.filter.unwrap();
        assert_eq!(filter.first.op, CompareOp::Eq);
        assert_eq!(filter.rest.len(), 1);
        assert_eq!(filter.rest[0].0, Logical::And);
        assert_eq!(filter.rest[0].1.operand, Operand::Value(Value::Float(1000.5)));
        let order = q.order_by.unwrap();
        assert_eq!(order.direction, SortDirection::Desc);
        assert_eq!(order.nulls, NullsPosition::First);
        assert_eq!(q.limit, Some(10));
        assert_eq!(q.offset, Some(5));
    }

    #[test]
    fn test_parse_count_and_keywords_case_insensitive() {
        let q = parse_soql("select count() from Contact where Email like '%@acme.com'").unwrap();
        assert!(q.is_count());
        let filter = q.filter.unwrap();
        assert_eq!(filter.first.op, CompareOp::Like);
    }

    #[test]
    fn test_parse_in_lists() {
        let q = parse_soql("SELECT Id FROM Lead WHERE Status NOT IN ('Closed', 'Lost') OR Rating IN (1, 2)")
            .unwrap();
        let filter = q.filter.unwrap();
        assert_eq!(filter.first.op, CompareOp::NotIn);
        assert_eq!(
            filter.first.operand,
            Operand::List(vec!["Closed".into(), "Lost".into()])
        );
        assert_eq!(filter.rest[0].1.operand, Operand::List(vec!["1".into(), "2".into()]));
    }

    #[test]
    fn test_literals() {
        let q = parse_soql("SELECT Id FROM Account WHERE A = true AND B = null AND C <> 42").unwrap();
        let filter = q.filter.unwrap();
        assert_eq!(filter.first.operand, Operand::Value(Value::Boolean(true)));
        assert_eq!(filter.rest[0].1.operand, Operand::Value(Value::Null));
        assert_eq!(filter.rest[1].1.op, CompareOp::NotEq);
        assert_eq!(filter.rest[1].1.operand, Operand::Value(Value::Integer(42)));
    }

    #[test]
    fn test_offset_before_limit() {
        let q = parse_soql("SELECT Id FROM Account OFFSET 2 LIMIT 3").unwrap();
        assert_eq!((q.limit, q.offset), (Some(3), Some(2)));
    }

    #[test]
    fn test_malformed_queries() {
        for bad in [
            "",
            "SELECT FROM Account",
            "SELECT Id Account",
            "SELECT Id FROM Account WHERE",
            "SELECT Id FROM Account WHERE Name",
            "SELECT Id FROM Account LIMIT ten",
            "SELECT Id FROM Account LIMIT 1 LIMIT 2",
            "SELECT Id FROM Account GROUP BY Name",
            "DELETE FROM Account",
        ] {
            assert!(
                matches!(parse_soql(bad), Err(MockError::MalformedQuery(_))),
                "expected MALFORMED_QUERY for {:?}",
                bad
            );
        }
    }
}
