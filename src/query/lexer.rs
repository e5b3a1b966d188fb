use crate::core::{MockError, Result};

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// Bare word: keyword, identifier or unquoted literal.
    Word(String),
    /// Single-quoted string with escapes resolved.
    Str(String),
    /// `{...}` search term.
    Braced(String),
    Comma,
    LParen,
    RParen,
    Star,
    Op(String),
}

impl Token {
    pub fn is_keyword(&self, keyword: &str) -> bool {
        matches!(self, Token::Word(w) if w.eq_ignore_ascii_case(keyword))
    }

    pub fn describe(&self) -> String {
        match self {
            Token::Word(w) => w.clone(),
            Token::Str(s) => format!("'{}'", s),
            Token::Braced(s) => format!("{{{}}}", s),
            Token::Comma => ",".into(),
            Token::LParen => "(".into(),
            Token::RParen => ")".into(),
            Token::Star => "*".into(),
            Token::Op(op) => op.clone(),
        }
    }
}

const DELIMITERS: &str = ",()'=<>!{}*";

pub fn tokenize(input: &str) -> Result<Vec<Token>> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
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
            '*' => {
                tokens.push(Token::Star);
                i += 1;
            }
            '\'' => {
                let (text, next) = read_quoted(&chars, i + 1)?;
                tokens.push(Token::Str(text));
                i = next;
            }
            '{' => {
                let start = i + 1;
                let end = chars[start..]
                    .iter()
                    .position(|&ch| ch == '}')
                    .map(|offset| start + offset)
                    .ok_or_else(|| MockError::MalformedQuery("unterminated '{' in search term".into()))?;
                tokens.push(Token::Braced(chars[start..end].iter().collect::<String>().trim().to_string()));
                i = end + 1;
            }
            '=' => {
                tokens.push(Token::Op("=".into()));
                i += 1;
            }
            '!' if chars.get(i + 1) == Some(&'=') => {
                tokens.push(Token::Op("!=".into()));
                i += 2;
            }
            '<' | '>' => {
                let next = chars.get(i + 1).copied();
                let op = match (c, next) {
                    ('<', Some('=')) => "<=",
                    ('<', Some('>')) => "<>",
                    ('>', Some('=')) => ">=",
                    ('<', _) => "<",
                    _ => ">",
                };
                tokens.push(Token::Op(op.into()));
                i += op.len();
            }
            '!' | '}' => {
                return Err(MockError::MalformedQuery(format!(
                    "unexpected character '{}' at position {}",
                    c, i
                )));
            }
            _ => {
                let start = i;
                while i < chars.len() && !chars[i].is_whitespace() && !DELIMITERS.contains(chars[i]) {
                    i += 1;
                }
                tokens.push(Token::Word(chars[start..i].iter().collect()));
            }
        }
    }

    Ok(tokens)
}

fn read_quoted(chars: &[char], mut i: usize) -> Result<(String, usize)> {
    let mut text = String::new();
    while i < chars.len() {
        match chars[i] {
            '\\' if i + 1 < chars.len() => {
                let escaped = chars[i + 1];
                match escaped {
                    'n' => text.push('\n'),
                    't' => text.push('\t'),
                    // LIKE wildcards keep their escape so the pattern matcher sees them.
                    '%' | '_' => {
                        text.push('\\');
                        text.push(escaped);
                    }
                    other => text.push(other),
                }
                i += 2;
            }
            '\'' => return Ok((text, i + 1)),
            c => {
                text.push(c);
                i += 1;
            }
        }
    }
    Err(MockError::MalformedQuery("unterminated string literal".into()))
}
