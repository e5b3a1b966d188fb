//! Runs a parsed SAQL pipeline over a dataset's rows.

use crate::core::{MockError, Record, Result, Value};
use crate::query::ast::{CompareOp, NullsPosition, OrderBy};
use crate::query::filter::apply_order_by;
use crate::query::saql::{Aggregate, FilterCondition, GenerateItem, Projection, SaqlQuery, Step};
use std::cmp::Ordering;

struct Group {
    key: Record,
    rows: Vec<Record>,
}

enum Stream {
    Rows(Vec<Record>),
    Groups(Vec<Group>),
}

/// Numbers compare numerically and text compares exactly; a mixed pair is
/// never equal.
fn same_value(actual: &Value, expected: &Value) -> bool {
    match (actual, expected) {
        (a, b) if a.is_numeric() && b.is_numeric() => a.compare(b) == Ordering::Equal,
        (Value::Text(a), Value::Text(b)) => a == b,
        (Value::Boolean(a), Value::Boolean(b)) => a == b,
        _ => false,
    }
}

/// Rows without the field never match; ordering operators only apply to numbers.
fn row_matches(row: &Record, condition: &FilterCondition) -> bool {
    let Some(actual) = row.get(&condition.field).filter(|v| !v.is_null()) else {
        return false;
    };
    let expected = &condition.value;
    match condition.op {
        CompareOp::Eq => same_value(actual, expected),
        CompareOp::NotEq => !same_value(actual, expected),
        op => {
            if !actual.is_numeric() || !expected.is_numeric() {
                return false;
            }
            let ord = actual.compare(expected);
            match op {
                CompareOp::Gt => ord == Ordering::Greater,
                CompareOp::GtEq => ord != Ordering::Less,
                CompareOp::Lt => ord == Ordering::Less,
                _ => ord != Ordering::Greater,
            }
        }
    }
}

fn aggregate(function: Aggregate, field: Option<&str>, rows: &[Record]) -> Value {
    let values = || {
        rows.iter()
            .filter_map(move |row| field.and_then(|f| row.get(f)))
            .filter(|v| !v.is_null())
    };
    match function {
        Aggregate::Count => Value::Integer(rows.len() as i64),
        Aggregate::Sum => {
            let numbers: Vec<&Value> = values().filter(|v| v.is_numeric()).collect();
            if numbers.iter().all(|v| matches!(v, Value::Integer(_))) {
                Value::Integer(
                    numbers
                        .iter()
                        .map(|v| match v {
                            Value::Integer(i) => *i,
                            _ => 0,
                        })
                        .sum(),
                )
            } else {
                Value::Float(numbers.iter().filter_map(|v| v.coerce_f64()).sum())
            }
        }
        Aggregate::Avg => {
            let numbers: Vec<f64> = values().filter_map(Value::coerce_f64).collect();
            if numbers.is_empty() {
                Value::Null
            } else {
                Value::Float(numbers.iter().sum::<f64>() / numbers.len() as f64)
            }
        }
        Aggregate::Min => values().min_by(|a, b| a.compare(b)).cloned().unwrap_or(Value::Null),
        Aggregate::Max => values().max_by(|a, b| a.compare(b)).cloned().unwrap_or(Value::Null),
    }
}

/// One output row. Plain fields come from the group key, or from the first
/// row when the stream was never grouped; missing fields are left out.
fn project_group(items: &[GenerateItem], key: &Record, rows: &[Record]) -> Record {
    let mut out = Record::new();
    for item in items {
        let value = match &item.projection {
            Projection::Field(field) => key
                .get(field)
                .or_else(|| rows.first().and_then(|row| row.get(field)))
                .cloned(),
            Projection::Aggregate(function, field) => {
                Some(aggregate(*function, field.as_deref(), rows))
            }
        };
        if let Some(value) = value {
            out.set(item.alias.clone(), value);
        }
    }
    out
}

fn project_rows(items: &[GenerateItem], rows: Vec<Record>) -> Vec<Record> {
    let has_aggregate = items
        .iter()
        .any(|item| matches!(item.projection, Projection::Aggregate(..)));
    if has_aggregate {
        // Aggregating an ungrouped stream treats it as `group by all`.
        return vec![project_group(items, &Record::new(), &rows)];
    }
    rows.iter()
        .map(|row| project_group(items, row, &[]))
        .collect()
}

fn group_rows(keys: &[String], rows: Vec<Record>) -> Vec<Group> {
    let mut groups: Vec<Group> = Vec::new();
    for row in rows {
        let mut key = Record::new();
        for field in keys {
            key.set(field.clone(), row.get(field).cloned().unwrap_or(Value::Null));
        }
        match groups.iter_mut().find(|group| group.key == key) {
            Some(group) => group.rows.push(row),
            None => groups.push(Group { key, rows: vec![row] }),
        }
    }
    if keys.is_empty() && groups.is_empty() {
        groups.push(Group {
            key: Record::new(),
            rows: Vec::new(),
        });
    }
    groups
}

fn rows_or_err(stream: Stream, step: &str) -> Result<Vec<Record>> {
    match stream {
        Stream::Rows(rows) => Ok(rows),
        Stream::Groups(_) => Err(MockError::MalformedQuery(format!(
            "{} needs a foreach after group",
            step
        ))),
    }
}

/// Apply every step in order to `rows`.
pub fn run(query: &SaqlQuery, rows: Vec<Record>) -> Result<Vec<Record>> {
    let mut stream = Stream::Rows(rows);

    for step in &query.steps {
        stream = match step {
            Step::Filter(conditions) => {
                let rows = rows_or_err(stream, "filter")?;
                Stream::Rows(
                    rows.into_iter()
                        .filter(|row| conditions.iter().all(|c| row_matches(row, c)))
                        .collect(),
                )
            }
            Step::Group(keys) => Stream::Groups(group_rows(keys, rows_or_err(stream, "group")?)),
            Step::Foreach(items) => match stream {
                Stream::Rows(rows) => Stream::Rows(project_rows(items, rows)),
                Stream::Groups(groups) => Stream::Rows(
                    groups
                        .iter()
                        .map(|group| project_group(items, &group.key, &group.rows))
                        .collect(),
                ),
            },
            Step::Order(keys) => {
                let mut rows = rows_or_err(stream, "order")?;
                // Stable sorts applied last key first give a multi-key order.
                for (field, direction) in keys.iter().rev() {
                    rows = apply_order_by(
                        rows,
                        &OrderBy {
                            field: field.clone(),
                            direction: *direction,
                            nulls: NullsPosition::Last,
                        },
                    );
                }
                Stream::Rows(rows)
            }
            Step::Limit(count) => {
                let mut rows = rows_or_err(stream, "limit")?;
                rows.truncate(*count);
                Stream::Rows(rows)
            }
        };
    }

    rows_or_err(stream, "the query result")
}

/// `lineageId`/`type` pairs taken from the first row.
pub fn metadata(records: &[Record]) -> Vec<serde_json::Value> {
    let Some(first) = records.first() else {
        return Vec::new();
    };
    first
        .iter()
        .map(|(name, value)| {
            serde_json::json!({
                "lineageId": name,
                "type": if value.is_numeric() { "numeric" } else { "string" },
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::saql::parse_saql;

    fn deal(name: &str, amount: i64, stage: &str) -> Record {
        let mut r = Record::new();
        r.set("Name", Value::from(name));
        r.set("Amount", Value::Integer(amount));
        r.set("Stage", Value::from(stage));
        r
    }

    fn deals() -> Vec<Record> {
        vec![
            deal("A", 50, "Won"),
            deal("B", 75, "Open"),
            deal("C", 120, "Won"),
            deal("D", 30, "Lost"),
        ]
    }

    fn run_saql(saql: &str) -> Result<Vec<Record>> {
        run(&parse_saql(saql)?, deals())
    }

    #[test]
    fn test_filter_is_type_strict() {
        let rows = run_saql("q = load \"d\"; q = filter q by 'Amount' == \"50\";").unwrap();
        assert!(rows.is_empty());
        let rows = run_saql("q = load \"d\"; q = filter q by 'Stage' != \"Won\" and 'Amount' > 40;").unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("Name"), Some(&Value::from("B")));
        let rows = run_saql("q = load \"d\"; q = filter q by 'Missing' != \"x\";").unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn test_group_then_aggregate() {
        let rows = run_saql(
            "q = load \"d\"; q = group q by 'Stage'; \
             q = foreach q generate 'Stage', count() as 'n', sum('Amount') as 'total', avg('Amount');\
             q = order q by 'total' desc;",
        )
        .unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].get("Stage"), Some(&Value::from("Won")));
        assert_eq!(rows[0].get("n"), Some(&Value::Integer(2)));
        assert_eq!(rows[0].get("total"), Some(&Value::Integer(170)));
        assert_eq!(rows[0].get("avg_Amount"), Some(&Value::Float(85.0)));
    }

    #[test]
    fn test_aggregate_without_group_is_one_row() {
        let rows = run_saql("q = load \"d\"; q = foreach q generate max('Amount') as 'top', count();").unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("top"), Some(&Value::Integer(120)));
        assert_eq!(rows[0].get("count"), Some(&Value::Integer(4)));
    }

    #[test]
    fn test_grouped_stream_must_be_projected() {
        let err = run_saql("q = load \"d\"; q = group q by all; q = limit q 1;").unwrap_err();
        assert!(matches!(err, MockError::MalformedQuery(_)));
    }

    #[test]
    fn test_metadata_types() {
        let rows = run_saql("q = load \"d\"; q = foreach q generate 'Name', 'Amount';").unwrap();
        let meta = metadata(&rows);
        assert_eq!(meta[0]["lineageId"], "Name");
        assert_eq!(meta[0]["type"], "string");
        assert_eq!(meta[1]["type"], "numeric");
        assert!(metadata(&[]).is_empty());
    }
}
