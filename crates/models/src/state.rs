use sea_orm::entity::prelude::*;
use sea_orm::{sea_query::OnConflict, ConnectionTrait, Set};
use serde::{Deserialize, Serialize};

use crate::{base, city, errors};

/// A top-level location. Owns many cities.
#[derive(Clone, Debug, Default, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "states")]
#[serde(default)]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
    pub name: String,
}

#[derive(Copy, Clone, Debug, EnumIter)]
pub enum Relation {
    Cities,
}

impl RelationTrait for Relation {
    fn def(&self) -> RelationDef {
        match self {
            Relation::Cities => Entity::has_many(city::Entity).into(),
        }
    }
}

impl Related<city::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Cities.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    pub fn new(name: impl Into<String>) -> Self {
        let now = base::now();
        Self { id: base::new_id(), created_at: now, updated_at: now, name: name.into() }
    }

    pub fn to_active(&self) -> ActiveModel {
        ActiveModel {
            id: Set(self.id.clone()),
            created_at: Set(self.created_at),
            updated_at: Set(self.updated_at),
            name: Set(self.name.clone()),
        }
    }
}

/// Insert the row, or overwrite every mutable column if the id already exists.
pub async fn upsert<C: ConnectionTrait>(db: &C, model: &Model) -> Result<(), errors::ModelError> {
    Entity::insert(model.to_active())
        .on_conflict(
            OnConflict::column(Column::Id)
                .update_columns([Column::UpdatedAt, Column::Name])
                .to_owned(),
        )
        .exec_without_returning(db)
        .await
        .map_err(|e| errors::ModelError::Db(e.to_string()))?;
    Ok(())
}
