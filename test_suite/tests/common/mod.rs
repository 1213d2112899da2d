use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use axum::{
    Json, Router,
    body::Body,
    extract::{Query, State},
    http::{HeaderMap, Request, StatusCode},
    routing::get,
};
use sea_orm::{ActiveValue::Set, Database, DatabaseConnection, DbErr, EntityTrait};
use sea_orm_migration::prelude::*;
use selectcrate::{
    Autocomplete, AutocompleteConfig, AutocompleteError, AutocompleteParams, Choice, ChoiceSource,
    EntityCollection, OracleError, Page, PermissionOracle, Principal, Settings,
};
use serde_json::{Value, json};
use tower::ServiceExt;

pub mod edition_entity;
pub mod magazine_entity;

pub type EditionAutocomplete = Autocomplete<EntityCollection<edition_entity::Entity>>;

#[allow(dead_code)]
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

#[allow(dead_code)]
pub async fn setup_test_db() -> Result<DatabaseConnection, DbErr> {
    init_tracing();
    let db = Database::connect("sqlite::memory:").await?;
    Migrator::up(&db, None).await?;
    Ok(db)
}

/// Two magazines (5 "Acme", 7 "Zenith") and `count` editions named
/// "Edition 1".."Edition N". The first five belong to magazine 5, every third
/// edition is unpublished.
#[allow(dead_code)]
pub async fn seed_editions(db: &DatabaseConnection, count: i32) -> Result<(), DbErr> {
    magazine_entity::Entity::insert_many([
        magazine_entity::ActiveModel {
            id: Set(5),
            name: Set("Acme".to_string()),
        },
        magazine_entity::ActiveModel {
            id: Set(7),
            name: Set("Zenith".to_string()),
        },
    ])
    .exec(db)
    .await?;

    if count == 0 {
        return Ok(());
    }

    let editions = (1..=count).map(|n| edition_entity::ActiveModel {
        id: Set(n),
        name: Set(format!("Edition {n}")),
        magazine_id: Set(if n <= 5 { 5 } else { 7 }),
        published: Set(n % 3 != 0),
        notes: Set(None),
    });
    edition_entity::Entity::insert_many(editions).exec(db).await?;
    Ok(())
}

#[allow(dead_code)]
pub async fn insert_edition(
    db: &DatabaseConnection,
    id: i32,
    name: &str,
    notes: Option<&str>,
) -> Result<(), DbErr> {
    edition_entity::Entity::insert(edition_entity::ActiveModel {
        id: Set(id),
        name: Set(name.to_string()),
        magazine_id: Set(5),
        published: Set(true),
        notes: Set(notes.map(ToString::to_string)),
    })
    .exec(db)
    .await?;
    Ok(())
}

#[allow(dead_code)]
pub fn edition_collection(db: DatabaseConnection) -> EntityCollection<edition_entity::Entity> {
    use edition_entity::Column;

    EntityCollection::new(db, Column::Id)
        .with_resource_type("edition")
        .with_columns([Column::Name, Column::MagazineId, Column::Published, Column::Notes])
}

#[allow(dead_code)]
pub fn edition_config() -> AutocompleteConfig {
    AutocompleteConfig::default()
        .with_search_fields(["name"])
        .with_display_fields(["name", "magazine_id"])
        .with_page_size(3)
}

#[allow(dead_code)]
pub fn edition_autocomplete(
    db: DatabaseConnection,
    config: AutocompleteConfig,
    oracle: Arc<dyn PermissionOracle>,
) -> EditionAutocomplete {
    Autocomplete::new(edition_collection(db), config, oracle, Settings::default())
}

/// Oracle granting a fixed set of permission names to every user, counting
/// how often it is asked.
#[derive(Default)]
pub struct StaticOracle {
    granted: HashSet<String>,
    calls: AtomicUsize,
}

#[allow(dead_code)]
impl StaticOracle {
    pub fn granting(permissions: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            granted: permissions.iter().map(ToString::to_string).collect(),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn viewer() -> Arc<Self> {
        Self::granting(&["view_edition"])
    }

    pub fn editor() -> Arc<Self> {
        Self::granting(&["view_edition", "add_edition", "change_edition", "delete_edition"])
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PermissionOracle for StaticOracle {
    async fn has_permissions(&self, _user_id: &str, permissions: &[String]) -> Result<bool, OracleError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(permissions.iter().all(|p| self.granted.contains(p)))
    }
}

fn principal(headers: &HeaderMap) -> Principal {
    headers
        .get("x-user-id")
        .and_then(|value| value.to_str().ok())
        .map_or(Principal::Anonymous, Principal::user)
}

async fn editions_handler(
    State(editions): State<Arc<EditionAutocomplete>>,
    headers: HeaderMap,
    Query(params): Query<AutocompleteParams>,
) -> Result<Page, AutocompleteError> {
    editions.resolve(&params, &principal(&headers)).await
}

async fn countries_handler(Query(params): Query<AutocompleteParams>) -> Json<Page<Choice>> {
    let countries = json!({
        "nz": "New Zealand",
        "ch": "Switzerland",
        "no": "Norway",
        "nl": "Netherlands",
    });
    let source = ChoiceSource::Mapping(countries.as_object().cloned().unwrap_or_default());
    Json(source.resolve_params(&params, &Settings::default().with_default_page_size(2)))
}

#[allow(dead_code)]
pub fn setup_test_app(editions: EditionAutocomplete) -> Router {
    let api = Router::new()
        .route("/autocomplete/editions", get(editions_handler))
        .with_state(Arc::new(editions))
        .route("/autocomplete/countries", get(countries_handler));

    Router::new().nest("/api/v1", api)
}

/// Issue a GET as `user` (anonymous when `None`) and decode the JSON body.
#[allow(dead_code)]
pub async fn get_json(app: &Router, uri: &str, user: Option<&str>) -> (StatusCode, Value) {
    let mut request = Request::builder().method("GET").uri(uri);
    if let Some(user) = user {
        request = request.header("x-user-id", user);
    }
    let request = request.body(Body::empty()).unwrap();

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&body).unwrap())
}

#[allow(dead_code)]
pub fn names(page: &Value) -> Vec<String> {
    page["results"]
        .as_array()
        .map(|results| {
            results
                .iter()
                .filter_map(|item| item["name"].as_str().map(ToString::to_string))
                .collect()
        })
        .unwrap_or_default()
}

#[allow(dead_code)]
pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![Box::new(CreateMagazineTable), Box::new(CreateEditionTable)]
    }
}

pub struct CreateMagazineTable;

#[async_trait::async_trait]
impl MigrationName for CreateMagazineTable {
    fn name(&self) -> &'static str {
        "m20250101_000001_create_magazine_table"
    }
}

#[async_trait::async_trait]
impl MigrationTrait for CreateMagazineTable {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        use magazine_entity::{Column, Entity};

        let table = Table::create()
            .table(Entity)
            .if_not_exists()
            .col(ColumnDef::new(Column::Id).integer().not_null().primary_key())
            .col(ColumnDef::new(Column::Name).text().not_null())
            .to_owned();

        manager.create_table(table).await?;
        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(magazine_entity::Entity).to_owned())
            .await?;
        Ok(())
    }
}

pub struct CreateEditionTable;

#[async_trait::async_trait]
impl MigrationName for CreateEditionTable {
    fn name(&self) -> &'static str {
        "m20250101_000002_create_edition_table"
    }
}

#[async_trait::async_trait]
impl MigrationTrait for CreateEditionTable {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        use edition_entity::{Column, Entity};

        let table = Table::create()
            .table(Entity)
            .if_not_exists()
            .col(ColumnDef::new(Column::Id).integer().not_null().primary_key())
            .col(ColumnDef::new(Column::Name).text().not_null())
            .col(ColumnDef::new(Column::MagazineId).integer().not_null())
            .col(
                ColumnDef::new(Column::Published)
                    .boolean()
                    .not_null()
                    .default(true),
            )
            .col(ColumnDef::new(Column::Notes).text().null())
            .foreign_key(
                ForeignKey::create()
                    .name("fk_editions_magazine")
                    .from(Entity, Column::MagazineId)
                    .to(magazine_entity::Entity, magazine_entity::Column::Id),
            )
            .to_owned();

        manager.create_table(table).await?;
        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(edition_entity::Entity).to_owned())
            .await?;
        Ok(())
    }
}
