use super::job::{Operation, RecordResult};
use crate::core::{ErrorCode, FieldType, Record, Schema, ValidationError, Value};
use crate::storage::{Collection, apply_update, new_record};
use crate::validation::{FieldValidator, ValidationMode};

/// Cell value that stands for an explicit null in bulk CSV.
pub const NULL_MARKER: &str = "#N/A";

/// Type raw CSV cells against the schema.
///
/// Blank cells are dropped (the field is left untouched), `#N/A` becomes
/// null, and cells of numeric or boolean fields are parsed when they can be.
pub fn type_record(raw: &Record, schema: &Schema) -> Record {
    raw.iter()
        .filter_map(|(name, value)| {
            let text = match value {
                Value::Text(text) => text,
                other => return Some((name.to_string(), other.clone())),
            };
            if text.is_empty() {
                return None;
            }
            if text == NULL_MARKER {
                return Some((name.to_string(), Value::Null));
            }
            let typed = schema
                .field(name)
                .map(|def| type_cell(text, &def.field_type))
                .unwrap_or_else(|| Value::Text(text.clone()));
            Some((name.to_string(), typed))
        })
        .collect()
}

fn type_cell(text: &str, field_type: &FieldType) -> Value {
    let parsed = match field_type {
        FieldType::Int => text.trim().parse::<i64>().ok().map(Value::Integer),
        FieldType::Double | FieldType::Currency | FieldType::Percent => {
            text.trim().parse::<f64>().ok().map(Value::Float)
        }
        FieldType::Boolean => match text.trim().to_ascii_lowercase().as_str() {
            "true" => Some(Value::Boolean(true)),
            "false" => Some(Value::Boolean(false)),
            _ => None,
        },
        _ => None,
    };
    parsed.unwrap_or_else(|| Value::Text(text.to_string()))
}

/// Applies one bulk operation to records of a single object.
///
/// Callers hold the collection's write lock for the whole batch, so a batch
/// is atomic with respect to other writers of the same object.
pub struct RecordProcessor<'a> {
    schema: &'a Schema,
    operation: Operation,
    external_id_field: Option<&'a str>,
    validator: FieldValidator,
}

impl<'a> RecordProcessor<'a> {
    pub fn new(schema: &'a Schema, operation: Operation) -> Self {
        Self {
            schema,
            operation,
            external_id_field: None,
            validator: FieldValidator::new(),
        }
    }

    pub fn external_id_field(mut self, field: Option<&'a str>) -> Self {
        self.external_id_field = field;
        self
    }

    /// Process every record in order. A failing record never stops the rest.
    pub fn process_all(&self, collection: &mut Collection, records: Vec<Record>) -> Vec<RecordResult> {
        records
            .into_iter()
            .map(|record| self.process(collection, record))
            .collect()
    }

    pub fn process(&self, collection: &mut Collection, input: Record) -> RecordResult {
        match self.operation {
            Operation::Insert => self.insert(collection, input),
            Operation::Update => self.update(collection, input),
            Operation::Upsert => self.upsert(collection, input),
            Operation::Delete => self.delete(collection, input),
            Operation::Query | Operation::QueryAll => RecordResult::failure(
                None,
                vec![ValidationError::new(
                    ErrorCode::InvalidOperation,
                    "",
                    format!("Unsupported operation: {}", self.operation),
                )],
                input,
            ),
        }
    }

    fn insert(&self, collection: &mut Collection, input: Record) -> RecordResult {
        let fields = without(&input, "Id");
        let errors = self.validator.validate(&fields, self.schema, ValidationMode::Create);
        if !errors.is_empty() {
            return RecordResult::failure(None, errors, input);
        }
        let record = new_record(self.schema, &fields);
        let id = record.id().unwrap_or_default().to_string();
        collection.push(record);
        RecordResult::success(id, true, input)
    }

    fn update(&self, collection: &mut Collection, input: Record) -> RecordResult {
        let Some(id) = non_blank_id(&input) else {
            return missing_id(input, "update");
        };
        let fields = without(&input, "Id");
        let errors = self.validator.validate(&fields, self.schema, ValidationMode::Update);
        let Some(record) = collection.find_by_id_mut(&id) else {
            let error = ValidationError::new(
                ErrorCode::InvalidCrossReferenceKey,
                "Id",
                format!("Record not found: {}", id),
            );
            return RecordResult::failure(Some(id), vec![error], input);
        };
        if !errors.is_empty() {
            return RecordResult::failure(Some(id), errors, input);
        }
        apply_update(record, &fields);
        RecordResult::success(id, false, input)
    }

    fn upsert(&self, collection: &mut Collection, input: Record) -> RecordResult {
        let external = self.external_id_field.unwrap_or("Id");
        let key = input
            .get(external)
            .filter(|v| !v.is_blank())
            .map(Value::coerce_string);

        let Some(key) = key else {
            return self.insert(collection, input);
        };

        let fields = without(&input, external);
        match collection.find_by_field_mut(external, &key) {
            Some(record) => {
                let id = record.id().map(str::to_string);
                let errors = self.validator.validate(&fields, self.schema, ValidationMode::Update);
                if !errors.is_empty() {
                    return RecordResult::failure(id, errors, input);
                }
                apply_update(record, &fields);
                RecordResult::success(id.unwrap_or_default(), false, input)
            }
            // `Id` is never carried into a new record; a custom external id is.
            None => self.insert(collection, input),
        }
    }

    fn delete(&self, collection: &mut Collection, input: Record) -> RecordResult {
        let Some(id) = non_blank_id(&input) else {
            return missing_id(input, "delete");
        };
        match collection.remove_by_id(&id) {
            Some(_) => RecordResult::success(id, false, input),
            None => {
                let error = ValidationError::new(
                    ErrorCode::EntityIsDeleted,
                    "Id",
                    format!("Entity is deleted or does not exist: {}", id),
                );
                RecordResult::failure(Some(id), vec![error], input)
            }
        }
    }
}

fn without(record: &Record, field: &str) -> Record {
    record
        .iter()
        .filter(|(name, _)| *name != field)
        .map(|(name, value)| (name.to_string(), value.clone()))
        .collect()
}

fn non_blank_id(record: &Record) -> Option<String> {
    record
        .get("Id")
        .filter(|v| !v.is_blank())
        .map(Value::coerce_string)
}

fn missing_id(input: Record, operation: &str) -> RecordResult {
    let error = ValidationError::new(
        ErrorCode::MissingArgument,
        "Id",
        format!("Id is required for {} operation", operation),
    );
    RecordResult::failure(None, vec![error], input)
}
