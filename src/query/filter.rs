use super::ast::{CompareOp, Condition, Logical, NullsPosition, Operand, OrderBy, SortDirection, WhereClause};
use super::pattern::eval_like;
use crate::core::{Record, Value};
use std::cmp::Ordering;
use tracing::debug;

static NULL: Value = Value::Null;

fn field_value<'a>(record: &'a Record, field: &str) -> &'a Value {
    record.get(field).unwrap_or(&NULL)
}

/// Evaluate one condition. Type mismatches make the condition false, never an error.
pub fn evaluate_condition(record: &Record, condition: &Condition) -> bool {
    let actual = field_value(record, &condition.field);

    match (&condition.op, &condition.operand) {
        (CompareOp::Eq, Operand::Value(expected)) => {
            actual.coerce_string() == expected.coerce_string()
        }
        (CompareOp::NotEq, Operand::Value(expected)) => {
            actual.coerce_string() != expected.coerce_string()
        }
        (CompareOp::Gt | CompareOp::GtEq | CompareOp::Lt | CompareOp::LtEq, Operand::Value(expected)) => {
            let (Some(a), Some(b)) = (actual.coerce_f64(), expected.coerce_f64()) else {
                return false;
            };
            match condition.op {
                CompareOp::Gt => a > b,
                CompareOp::GtEq => a >= b,
                CompareOp::Lt => a < b,
                _ => a <= b,
            }
        }
        (CompareOp::Like, Operand::Value(pattern)) => {
            if actual.is_null() {
                return false;
            }
            match eval_like(&actual.coerce_string(), &pattern.coerce_string()) {
                Ok(matched) => matched,
                Err(err) => {
                    debug!(error = %err, "LIKE pattern rejected");
                    false
                }
            }
        }
        (CompareOp::In, Operand::List(members)) => {
            let actual = actual.coerce_string();
            members.iter().any(|m| *m == actual)
        }
        (CompareOp::NotIn, Operand::List(members)) => {
            let actual = actual.coerce_string();
            !members.iter().any(|m| *m == actual)
        }
        _ => false,
    }
}

/// Fold the clause left to right: `a OR b AND c` is `(a OR b) AND c`.
pub fn matches(record: &Record, clause: &WhereClause) -> bool {
    let mut result = evaluate_condition(record, &clause.first);
    for (logical, condition) in &clause.rest {
        let next = evaluate_condition(record, condition);
        result = match logical {
            Logical::And => result && next,
            Logical::Or => result || next,
        };
    }
    result
}

pub fn apply_where(records: Vec<Record>, clause: &WhereClause) -> Vec<Record> {
    records.into_iter().filter(|r| matches(r, clause)).collect()
}

/// Stable sort on one field. Null placement follows `NULLS FIRST|LAST`
/// regardless of direction.
pub fn apply_order_by(mut records: Vec<Record>, order: &OrderBy) -> Vec<Record> {
    records.sort_by(|a, b| {
        let left = field_value(a, &order.field);
        let right = field_value(b, &order.field);
        match (left.is_null(), right.is_null()) {
            (true, true) => Ordering::Equal,
            (true, false) => match order.nulls {
                NullsPosition::First => Ordering::Less,
                NullsPosition::Last => Ordering::Greater,
            },
            (false, true) => match order.nulls {
                NullsPosition::First => Ordering::Greater,
                NullsPosition::Last => Ordering::Less,
            },
            (false, false) => {
                let ord = left.compare(right);
                match order.direction {
                    SortDirection::Asc => ord,
                    SortDirection::Desc => ord.reverse(),
                }
            }
        }
    });
    records
}

/// OFFSET first, then LIMIT.
pub fn paginate(records: Vec<Record>, offset: Option<usize>, limit: Option<usize>) -> Vec<Record> {
    let iter = records.into_iter().skip(offset.unwrap_or(0));
    match limit {
        Some(limit) => iter.take(limit).collect(),
        None => iter.collect(),
    }
}
