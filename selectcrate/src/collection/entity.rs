//! Sea-ORM backed collection.

use std::sync::Arc;

use async_trait::async_trait;
use sea_orm::{
    ColumnTrait, ColumnType, Condition, DatabaseConnection, EntityTrait, IdenStatic,
    Order, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Select,
    sea_query::{Alias, Expr, Func, LikeExpr, SimpleExpr},
};
use serde_json::Value;
use uuid::Uuid;

use super::{Collection, Predicate, Record};
use crate::errors::CollectionError;
use crate::query::OrderField;

// Basic safety limit on search terms sent to the database
const MAX_SEARCH_QUERY_LENGTH: usize = 1_000;

/// Escape LIKE wildcards so user input only ever matches literally.
fn escape_like_wildcards(input: &str) -> String {
    input
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

/// Collection over a Sea-ORM entity.
///
/// Only registered lookup paths are reachable. Every column registered with
/// [`with_columns`](Self::with_columns) is addressable by its column name, and
/// [`with_lookup`](Self::with_lookup) adds aliases such as `magazine__id`.
///
/// ```rust,ignore
/// let editions = EntityCollection::<edition::Entity>::new(db, edition::Column::Id)
///     .with_columns([edition::Column::Name, edition::Column::MagazineId])
///     .with_lookup("magazine__id", edition::Column::MagazineId)
///     .with_default_ordering(vec![OrderField::asc("name")]);
/// ```
pub struct EntityCollection<E: EntityTrait> {
    db: DatabaseConnection,
    resource_type: String,
    primary_key: (String, E::Column),
    lookups: Arc<Vec<(String, E::Column)>>,
    default_ordering: Vec<OrderField>,
    condition: Condition,
    ordering: Vec<(E::Column, Order)>,
    projection: Vec<(String, E::Column)>,
}

impl<E: EntityTrait> Clone for EntityCollection<E> {
    fn clone(&self) -> Self {
        Self {
            db: self.db.clone(),
            resource_type: self.resource_type.clone(),
            primary_key: self.primary_key.clone(),
            lookups: Arc::clone(&self.lookups),
            default_ordering: self.default_ordering.clone(),
            condition: self.condition.clone(),
            ordering: self.ordering.clone(),
            projection: self.projection.clone(),
        }
    }
}

impl<E: EntityTrait> std::fmt::Debug for EntityCollection<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityCollection")
            .field("resource_type", &self.resource_type)
            .field("primary_key", &self.primary_key.0)
            .field("lookups", &self.lookups.iter().map(|(name, _)| name).collect::<Vec<_>>())
            .field("condition", &self.condition)
            .finish_non_exhaustive()
    }
}

impl<E: EntityTrait> EntityCollection<E> {
    /// Collection over every row of `E`, named after its table.
    pub fn new(db: DatabaseConnection, primary_key: E::Column) -> Self {
        let name = primary_key.as_str().to_string();
        Self {
            db,
            resource_type: E::default().table_name().to_string(),
            primary_key: (name.clone(), primary_key),
            lookups: Arc::new(vec![(name, primary_key)]),
            default_ordering: Vec::new(),
            condition: Condition::all(),
            ordering: Vec::new(),
            projection: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_resource_type(mut self, resource_type: impl Into<String>) -> Self {
        self.resource_type = resource_type.into();
        self
    }

    /// Register columns under their own names.
    #[must_use]
    pub fn with_columns(self, columns: impl IntoIterator<Item = E::Column>) -> Self {
        columns
            .into_iter()
            .fold(self, |collection, column| collection.with_lookup(column.as_str(), column))
    }

    /// Register a lookup path for a column.
    #[must_use]
    pub fn with_lookup(mut self, path: &str, column: E::Column) -> Self {
        let lookups = Arc::make_mut(&mut self.lookups);
        lookups.retain(|(name, _)| name != path);
        lookups.push((path.to_string(), column));
        self
    }

    #[must_use]
    pub fn with_default_ordering(mut self, ordering: Vec<OrderField>) -> Self {
        self.default_ordering = ordering;
        self
    }

    fn column(&self, path: &str) -> Option<E::Column> {
        self.lookups
            .iter()
            .find(|(name, _)| name == path)
            .map(|(_, column)| *column)
    }

    fn select(&self) -> Select<E> {
        E::find().filter(self.condition.clone())
    }

    fn condition_for(&self, predicate: &Predicate) -> Condition {
        match predicate {
            // NULL columns must compare false rather than unknown, or a
            // negated condition would drop them too
            Predicate::Exact { path, value } => self
                .column(path)
                .and_then(|column| {
                    exact_expr(column, value)
                        .map(|expr| Condition::all().add(expr).add(column.is_not_null()))
                })
                .unwrap_or_else(|| Condition::all().add(never())),
            Predicate::IContains { path, value } => self.column(path).map_or_else(
                || Condition::all().add(never()),
                |column| {
                    Condition::all()
                        .add(icontains_expr(column, value))
                        .add(column.is_not_null())
                },
            ),
            Predicate::Any(predicates) if predicates.is_empty() => Condition::all().add(never()),
            Predicate::Any(predicates) => predicates
                .iter()
                .fold(Condition::any(), |any, p| any.add(self.condition_for(p))),
            Predicate::Nothing => Condition::all().add(never()),
        }
    }
}

/// Always-false expression.
fn never() -> SimpleExpr {
    Expr::val(1).eq(0)
}

/// Equality with the value parsed according to the column type.
///
/// Returns `None` when the value cannot be represented in the column type.
fn exact_expr<C: ColumnTrait>(column: C, value: &str) -> Option<SimpleExpr> {
    let trimmed = value.trim();
    let expr = match column.def().get_column_type() {
        ColumnType::TinyInteger
        | ColumnType::SmallInteger
        | ColumnType::Integer
        | ColumnType::BigInteger
        | ColumnType::TinyUnsigned
        | ColumnType::SmallUnsigned
        | ColumnType::Unsigned
        | ColumnType::BigUnsigned => column.eq(trimmed.parse::<i64>().ok()?),
        ColumnType::Float | ColumnType::Double | ColumnType::Decimal(_) => {
            column.eq(trimmed.parse::<f64>().ok()?)
        }
        ColumnType::Boolean => column.eq(parse_bool(trimmed)?),
        ColumnType::Uuid => column.eq(Uuid::parse_str(trimmed).ok()?),
        _ => column.eq(value),
    };
    Some(expr)
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "1" => Some(true),
        "false" | "0" => Some(false),
        _ => None,
    }
}

/// `UPPER(CAST(col AS TEXT)) LIKE UPPER('%term%') ESCAPE '\'`
fn icontains_expr<C: ColumnTrait>(column: C, value: &str) -> SimpleExpr {
    let bounded: String = value.chars().take(MAX_SEARCH_QUERY_LENGTH).collect();
    let pattern = format!("%{}%", escape_like_wildcards(&bounded).to_uppercase());
    let text = Expr::cast_as(Expr::col(column), Alias::new("TEXT"));
    Expr::expr(Func::upper(text)).like(LikeExpr::new(pattern).escape('\\'))
}

#[async_trait]
impl<E> Collection for EntityCollection<E>
where
    E: EntityTrait + Sync,
    E::Model: Sync,
{
    fn resource_type(&self) -> Option<&str> {
        Some(self.resource_type.as_str()).filter(|name| !name.is_empty())
    }

    fn primary_key(&self) -> &str {
        &self.primary_key.0
    }

    fn default_ordering(&self) -> Vec<OrderField> {
        self.default_ordering.clone()
    }

    fn has_lookup(&self, path: &str) -> bool {
        self.column(path).is_some()
    }

    fn all(&self) -> Self {
        Self {
            condition: Condition::all(),
            ordering: Vec::new(),
            projection: Vec::new(),
            ..self.clone()
        }
    }

    fn filter(mut self, predicate: Predicate) -> Self {
        let condition = self.condition_for(&predicate);
        self.condition = self.condition.add(condition);
        self
    }

    fn exclude(mut self, predicate: Predicate) -> Self {
        let condition = self.condition_for(&predicate).not();
        self.condition = self.condition.add(condition);
        self
    }

    fn order_by(mut self, fields: &[OrderField]) -> Self {
        self.ordering = fields
            .iter()
            .filter_map(|field| {
                let column = self.column(&field.field);
                if column.is_none() {
                    tracing::debug!(field = %field.field, "Ignoring unknown ordering field");
                }
                let direction = if field.descending { Order::Desc } else { Order::Asc };
                column.map(|column| (column, direction))
            })
            .collect();
        self
    }

    fn project(mut self, fields: &[String]) -> Self {
        self.projection = fields
            .iter()
            .filter_map(|field| {
                let column = self.column(field);
                if column.is_none() {
                    tracing::debug!(field = %field, "Ignoring unknown projected field");
                }
                column.map(|column| (field.clone(), column))
            })
            .collect();
        self
    }

    async fn count(&self) -> Result<u64, CollectionError> {
        Ok(PaginatorTrait::count(self.select(), &self.db).await?)
    }

    async fn slice(&self, offset: u64, limit: u64) -> Result<Vec<Record>, CollectionError> {
        let mut query = self.select();
        for (column, direction) in &self.ordering {
            query = query.order_by(*column, direction.clone());
        }
        if !self.projection.is_empty() {
            // Keyed by lookup path so aliases come back under the requested name
            query = self
                .projection
                .iter()
                .fold(query.select_only(), |query, (path, column)| {
                    query.column_as(*column, path.as_str())
                });
        }

        let rows = query
            .offset(offset)
            .limit(limit)
            .into_json()
            .all(&self.db)
            .await?;

        Ok(rows
            .into_iter()
            .filter_map(|row| match row {
                Value::Object(map) => Some(map),
                _ => None,
            })
            .collect())
    }
}
