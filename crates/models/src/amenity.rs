use sea_orm::entity::prelude::*;
use sea_orm::{sea_query::OnConflict, ConnectionTrait, Set};
use serde::{Deserialize, Serialize};

use crate::{base, errors, place, place_amenity};

#[derive(Clone, Debug, Default, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "amenities")]
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
    PlaceAmenity,
}

impl RelationTrait for Relation {
    fn def(&self) -> RelationDef {
        match self {
            Relation::PlaceAmenity => Entity::has_many(place_amenity::Entity).into(),
        }
    }
}

impl Related<place_amenity::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::PlaceAmenity.def()
    }
}

impl Related<place::Entity> for Entity {
    fn to() -> RelationDef {
        place_amenity::Relation::Place.def()
    }

    fn via() -> Option<RelationDef> {
        Some(place_amenity::Relation::Amenity.def().rev())
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
