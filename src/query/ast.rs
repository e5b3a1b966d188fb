use crate::core::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    NotEq,
    Gt,
    GtEq,
    Lt,
    LtEq,
    Like,
    In,
    NotIn,
}

impl CompareOp {
    pub fn from_symbol(symbol: &str) -> Option<Self> {
        match symbol {
            "=" => Some(Self::Eq),
            "!=" | "<>" => Some(Self::NotEq),
            ">" => Some(Self::Gt),
            ">=" => Some(Self::GtEq),
            "<" => Some(Self::Lt),
            "<=" => Some(Self::LtEq),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Value(Value),
    /// `IN (...)` members, compared as strings.
    List(Vec<String>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub field: String,
    pub op: CompareOp,
    pub operand: Operand,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Logical {
    And,
    Or,
}

/// Conditions folded strictly left to right; `AND` does not bind tighter than `OR`.
#[derive(Debug, Clone, PartialEq)]
pub struct WhereClause {
    pub first: Condition,
    pub rest: Vec<(Logical, Condition)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NullsPosition {
    First,
    #[default]
    Last,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderBy {
    pub field: String,
    pub direction: SortDirection,
    pub nulls: NullsPosition,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SelectList {
    Count,
    /// Field names; `*` selects every field.
    Fields(Vec<String>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SoqlQuery {
    pub select: SelectList,
    pub object: String,
    pub filter: Option<WhereClause>,
    pub order_by: Option<OrderBy>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

impl SoqlQuery {
    pub fn is_count(&self) -> bool {
        matches!(self.select, SelectList::Count)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SearchScope {
    #[default]
    All,
    Name,
    Email,
    Phone,
    Sidebar,
}

impl SearchScope {
    pub fn parse(word: &str) -> Option<Self> {
        match word.to_ascii_uppercase().as_str() {
            "ALL" => Some(Self::All),
            "NAME" => Some(Self::Name),
            "EMAIL" => Some(Self::Email),
            "PHONE" => Some(Self::Phone),
            "SIDEBAR" => Some(Self::Sidebar),
            _ => None,
        }
    }

    /// Fields scanned under this scope; `None` means every field.
    pub fn fields(&self) -> Option<&'static [&'static str]> {
        match self {
            Self::Name => Some(&["Name", "FirstName", "LastName", "Title", "Subject"]),
            Self::Email => Some(&["Email", "PersonEmail"]),
            Self::Phone => Some(&["Phone", "MobilePhone", "Fax", "HomePhone"]),
            Self::All | Self::Sidebar => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReturningSpec {
    pub object: String,
    /// Empty means every field.
    pub fields: Vec<String>,
    pub filter: Option<WhereClause>,
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SoslSearch {
    pub term: String,
    pub scope: SearchScope,
    pub returning: Vec<ReturningSpec>,
}
