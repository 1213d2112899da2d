use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "editions")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: i32,
    pub name: String,
    pub magazine_id: i32,
    pub published: bool,
    #[sea_orm(column_type = "Text", nullable)]
    pub notes: Option<String>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::magazine_entity::Entity",
        from = "Column::MagazineId",
        to = "super::magazine_entity::Column::Id"
    )]
    Magazine,
}

impl Related<super::magazine_entity::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Magazine.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
