//! In-memory collection over JSON records.

use std::cmp::Ordering;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use super::{Collection, LOOKUP_SEPARATOR, Predicate, Record};
use crate::errors::CollectionError;
use crate::query::OrderField;

#[derive(Debug, Clone)]
enum Step {
    Filter(Predicate),
    Exclude(Predicate),
}

/// Collection backed by a shared list of JSON objects.
///
/// Lookup paths traverse nested objects, so `publisher__name` reads
/// `record["publisher"]["name"]`. Equality compares the string form of
/// scalars, which is how values arrive from a query string.
#[derive(Debug, Clone)]
pub struct MemoryCollection {
    resource_type: Option<String>,
    primary_key: String,
    records: Arc<Vec<Record>>,
    default_ordering: Vec<OrderField>,
    steps: Vec<Step>,
    ordering: Option<Vec<OrderField>>,
    projection: Vec<String>,
}

impl MemoryCollection {
    /// Collection over `records`, keyed by `id`. Non-object values are dropped.
    pub fn new(records: impl IntoIterator<Item = Value>) -> Self {
        let records = records
            .into_iter()
            .filter_map(|value| match value {
                Value::Object(map) => Some(map),
                _ => None,
            })
            .collect();

        Self {
            resource_type: None,
            primary_key: "id".to_string(),
            records: Arc::new(records),
            default_ordering: Vec::new(),
            steps: Vec::new(),
            ordering: None,
            projection: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_resource_type(mut self, resource_type: impl Into<String>) -> Self {
        self.resource_type = Some(resource_type.into());
        self
    }

    #[must_use]
    pub fn with_primary_key(mut self, primary_key: impl Into<String>) -> Self {
        self.primary_key = primary_key.into();
        self
    }

    #[must_use]
    pub fn with_default_ordering(mut self, ordering: Vec<OrderField>) -> Self {
        self.default_ordering = ordering;
        self
    }

    fn matching(&self) -> Vec<&Record> {
        let mut rows: Vec<&Record> = self
            .records
            .iter()
            .filter(|record| {
                self.steps.iter().all(|step| match step {
                    Step::Filter(predicate) => matches(record, predicate),
                    Step::Exclude(predicate) => !matches(record, predicate),
                })
            })
            .collect();

        if let Some(ordering) = &self.ordering {
            // Stable sort keeps insertion order for ties
            rows.sort_by(|a, b| compare_records(a, b, ordering));
        }
        rows
    }

    fn project_record(&self, record: &Record) -> Record {
        if self.projection.is_empty() {
            return record.clone();
        }
        self.projection
            .iter()
            .map(|field| {
                let value = lookup(record, field).cloned().unwrap_or(Value::Null);
                (field.clone(), value)
            })
            .collect()
    }
}

#[async_trait]
impl Collection for MemoryCollection {
    fn resource_type(&self) -> Option<&str> {
        self.resource_type.as_deref()
    }

    fn primary_key(&self) -> &str {
        &self.primary_key
    }

    fn default_ordering(&self) -> Vec<OrderField> {
        self.default_ordering.clone()
    }

    fn has_lookup(&self, path: &str) -> bool {
        self.records.is_empty() || self.records.iter().any(|record| lookup(record, path).is_some())
    }

    fn all(&self) -> Self {
        Self {
            steps: Vec::new(),
            ordering: None,
            projection: Vec::new(),
            ..self.clone()
        }
    }

    fn filter(mut self, predicate: Predicate) -> Self {
        self.steps.push(Step::Filter(predicate));
        self
    }

    fn exclude(mut self, predicate: Predicate) -> Self {
        self.steps.push(Step::Exclude(predicate));
        self
    }

    fn order_by(mut self, fields: &[OrderField]) -> Self {
        self.ordering = Some(fields.to_vec());
        self
    }

    fn project(mut self, fields: &[String]) -> Self {
        self.projection = fields.to_vec();
        self
    }

    async fn count(&self) -> Result<u64, CollectionError> {
        u64::try_from(self.matching().len()).map_err(|e| CollectionError::Message(e.to_string()))
    }

    async fn slice(&self, offset: u64, limit: u64) -> Result<Vec<Record>, CollectionError> {
        let offset = usize::try_from(offset).map_err(|e| CollectionError::Message(e.to_string()))?;
        let limit = usize::try_from(limit).map_err(|e| CollectionError::Message(e.to_string()))?;
        Ok(self
            .matching()
            .into_iter()
            .skip(offset)
            .take(limit)
            .map(|record| self.project_record(record))
            .collect())
    }
}

/// Resolve a `__`-separated lookup path inside a record.
pub(crate) fn lookup<'a>(record: &'a Record, path: &str) -> Option<&'a Value> {
    let mut segments = path.split(LOOKUP_SEPARATOR);
    let mut current = record.get(segments.next()?)?;
    for segment in segments {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

/// String form of a scalar, as it would arrive in a query string.
fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn matches(record: &Record, predicate: &Predicate) -> bool {
    match predicate {
        Predicate::Exact { path, value } => lookup(record, path).is_some_and(|field| match field {
            Value::Bool(b) => value.eq_ignore_ascii_case(&b.to_string()),
            Value::Number(n) => n.to_string() == *value
                || value.parse::<f64>().ok().zip(n.as_f64()).is_some_and(|(a, b)| a == b),
            other => scalar_text(other).is_some_and(|text| text == *value),
        }),
        Predicate::IContains { path, value } => lookup(record, path)
            .and_then(scalar_text)
            .is_some_and(|text| text.to_lowercase().contains(&value.to_lowercase())),
        Predicate::Any(predicates) => predicates.iter().any(|p| matches(record, p)),
        Predicate::Nothing => false,
    }
}

fn compare_records(a: &Record, b: &Record, ordering: &[OrderField]) -> Ordering {
    for field in ordering {
        let left = lookup(a, &field.field).unwrap_or(&Value::Null);
        let right = lookup(b, &field.field).unwrap_or(&Value::Null);
        let mut cmp = compare_values(left, right);
        if field.descending {
            cmp = cmp.reverse();
        }
        if cmp != Ordering::Equal {
            return cmp;
        }
    }
    Ordering::Equal
}

fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}

fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => match (x.as_i64(), y.as_i64()) {
            (Some(x), Some(y)) => x.cmp(&y),
            _ => x
                .as_f64()
                .unwrap_or(f64::NAN)
                .partial_cmp(&y.as_f64().unwrap_or(f64::NAN))
                .unwrap_or(Ordering::Equal),
        },
        (Value::String(x), Value::String(y)) => x.cmp(y),
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn magazines() -> MemoryCollection {
        MemoryCollection::new(vec![
            json!({"id": 1, "name": "Spring Edition", "year": 2021, "magazine": {"id": 5, "name": "Acme"}}),
            json!({"id": 2, "name": "Summer Edition", "year": 2020, "magazine": {"id": 5, "name": "Acme"}}),
            json!({"id": 3, "name": "Autumn Special", "year": 2021, "magazine": {"id": 7, "name": "Zenith"}}),
            json!({"id": 4, "name": "Winter", "year": null, "magazine": {"id": 7, "name": "Zenith"}}),
        ])
        .with_resource_type("edition")
    }

    async fn ids(collection: &MemoryCollection) -> Vec<i64> {
        collection
            .slice(0, 100)
            .await
            .unwrap()
            .iter()
            .map(|r| r["id"].as_i64().unwrap())
            .collect()
    }

    #[test]
    fn test_lookup_nested_paths() {
        let record = json!({"magazine": {"publisher": {"name": "Acme"}}});
        let record = record.as_object().unwrap();
        assert_eq!(lookup(record, "magazine__publisher__name"), Some(&json!("Acme")));
        assert_eq!(lookup(record, "magazine__missing"), None);
        assert_eq!(lookup(record, "magazine__publisher__name__deeper"), None);
    }

    #[tokio::test]
    async fn test_filter_exact_on_nested_number() {
        let filtered = magazines().filter(Predicate::exact("magazine__id", "5"));
        assert_eq!(ids(&filtered).await, vec![1, 2]);
        assert_eq!(filtered.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_exclude_after_filter() {
        let collection = magazines()
            .filter(Predicate::exact("year", "2021"))
            .exclude(Predicate::exact("magazine__id", "7"));
        assert_eq!(ids(&collection).await, vec![1]);
    }

    #[tokio::test]
    async fn test_icontains_is_case_insensitive() {
        let collection = magazines().filter(Predicate::search(&["name"], "EDITION"));
        assert_eq!(ids(&collection).await, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_nothing_is_empty() {
        assert_eq!(magazines().none().count().await.unwrap(), 0);
        assert_eq!(
            magazines().filter(Predicate::Any(Vec::new())).count().await.unwrap(),
            0
        );
    }

    #[tokio::test]
    async fn test_order_by_multiple_fields_with_nulls_first() {
        let ordered = magazines().order_by(&[OrderField::desc("year"), OrderField::asc("name")]);
        assert_eq!(ids(&ordered).await, vec![3, 1, 2, 4]);

        let ordered = magazines().order_by(&[OrderField::asc("year"), OrderField::asc("id")]);
        assert_eq!(ids(&ordered).await, vec![4, 2, 1, 3]);
    }

    #[tokio::test]
    async fn test_projection_and_slicing() {
        let projected = magazines()
            .order_by(&[OrderField::asc("id")])
            .project(&["id".to_string(), "magazine__name".to_string()]);
        let rows = projected.slice(1, 2).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0], *json!({"id": 2, "magazine__name": "Acme"}).as_object().unwrap());
        assert_eq!(rows[1]["magazine__name"], json!("Zenith"));
    }

    #[tokio::test]
    async fn test_all_resets_composition() {
        let narrowed = magazines().none();
        assert_eq!(narrowed.all().count().await.unwrap(), 4);
    }

    #[test]
    fn test_has_lookup() {
        let collection = magazines();
        assert!(collection.has_lookup("magazine__name"));
        assert!(!collection.has_lookup("publisher__name"));
        assert!(MemoryCollection::new(Vec::new()).has_lookup("anything"));
    }
}
