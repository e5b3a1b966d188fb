use super::ast::{ReturningSpec, SearchScope, SoslSearch};
use super::lexer::{Token, tokenize};
use super::soql::{Parser, WhereDialect};
use crate::core::{MockError, Record, Result, Value};

/// Parse `FIND {term} [IN <scope> FIELDS] RETURNING Obj(f1, f2 [WHERE ...] [LIMIT n]), ...`.
pub fn parse_sosl(text: &str) -> Result<SoslSearch> {
    if text.trim().is_empty() {
        return Err(MockError::MalformedQuery("SOSL query is required".into()));
    }
    let mut p = Parser::new(tokenize(text)?);

    p.expect_keyword("FIND")?;
    let term = match p.advance() {
        Some(Token::Braced(term)) if !term.is_empty() => term,
        _ => {
            return Err(MockError::MalformedQuery(format!(
                "Cannot parse FIND clause: {}",
                text.trim()
            )));
        }
    };

    let mut scope = SearchScope::All;
    if p.eat_keyword("IN") {
        let word = match p.advance() {
            Some(Token::Word(w)) => w,
            _ => return Err(MockError::MalformedQuery("expected search scope after IN".into())),
        };
        scope = SearchScope::parse(&word)
            .ok_or_else(|| MockError::MalformedQuery(format!("unknown search scope '{}'", word)))?;
        p.expect_keyword("FIELDS")?;
    }

    if !p.eat_keyword("RETURNING") {
        return Err(MockError::MalformedQuery(format!(
            "Cannot parse RETURNING clause: {}",
            text.trim()
        )));
    }

    let mut returning = vec![parse_returning(&mut p)?];
    while p.eat(&Token::Comma) {
        returning.push(parse_returning(&mut p)?);
    }
    p.expect_end()?;

    Ok(SoslSearch {
        term,
        scope,
        returning,
    })
}

fn parse_returning(p: &mut Parser) -> Result<ReturningSpec> {
    let object = p.expect_identifier("object name in RETURNING")?;
    let mut spec = ReturningSpec {
        object,
        fields: Vec::new(),
        filter: None,
        limit: None,
    };

    if !p.eat(&Token::LParen) {
        return Ok(spec);
    }

    if !p.peek_keyword("WHERE") && !p.peek_keyword("LIMIT") && p.peek() != Some(&Token::RParen) {
        loop {
            if p.eat(&Token::Star) {
                spec.fields.push("*".to_string());
            } else {
                spec.fields.push(p.expect_identifier("field name in RETURNING")?);
            }
            if !p.eat(&Token::Comma) {
                break;
            }
        }
    }
    if p.eat_keyword("WHERE") {
        spec.filter = Some(p.parse_where(WhereDialect::Comparisons)?);
    }
    if p.eat_keyword("LIMIT") {
        spec.limit = Some(p.expect_count("LIMIT")?);
    }
    p.expect(Token::RParen)?;
    Ok(spec)
}

/// Case-insensitive substring search over the scope's fields.
/// Only text and numeric values are scanned.
pub fn search_records(records: Vec<Record>, term: &str, scope: SearchScope) -> Vec<Record> {
    let needle = term.to_lowercase();
    records
        .into_iter()
        .filter(|record| record_matches(record, &needle, scope))
        .collect()
}

fn record_matches(record: &Record, needle: &str, scope: SearchScope) -> bool {
    let hit = |value: &Value| match value {
        Value::Text(_) | Value::Integer(_) | Value::Float(_) => {
            value.to_string().to_lowercase().contains(needle)
        }
        _ => false,
    };
    match scope.fields() {
        Some(fields) => fields
            .iter()
            .filter_map(|field| record.get(field))
            .any(hit),
        None => record.iter().any(|(_, value)| hit(value)),
    }
}
