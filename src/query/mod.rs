//! SOQL, SOSL and SAQL: tokenizers, recursive-descent parsers and in-memory execution.

pub mod ast;
pub mod executor;
pub mod filter;
pub mod lexer;
pub mod pattern;
pub mod saql;
pub mod soql;
pub mod sosl;

pub use ast::{SearchScope, SoqlQuery, SoslSearch};
pub use executor::{QueryEngine, QueryResult, SearchResult, project, record_url};
pub use filter::{apply_order_by, apply_where, paginate};
pub use saql::{SaqlQuery, parse_saql};
pub use soql::parse_soql;
pub use sosl::{parse_sosl, search_records};
