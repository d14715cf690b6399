//! Join entity for the Place <-> Amenity many-to-many relationship.
//!
//! A row has no identity of its own: it is owned by the `(place_id, amenity_id)` pair
//! and disappears when either side is deleted.

use std::collections::BTreeSet;

use sea_orm::entity::prelude::*;
use sea_orm::{ConnectionTrait, QueryFilter, QueryOrder, Set};
use serde::{Deserialize, Serialize};

use crate::{amenity, errors, place};

#[derive(Clone, Debug, PartialEq, Eq, Hash, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "place_amenity")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub place_id: String,
    #[sea_orm(primary_key, auto_increment = false)]
    pub amenity_id: String,
}

#[derive(Copy, Clone, Debug, EnumIter)]
pub enum Relation {
    Place,
    Amenity,
}

impl RelationTrait for Relation {
    fn def(&self) -> RelationDef {
        match self {
            Relation::Place => Entity::belongs_to(place::Entity)
                .from(Column::PlaceId)
                .to(place::Column::Id)
                .into(),
            Relation::Amenity => Entity::belongs_to(amenity::Entity)
                .from(Column::AmenityId)
                .to(amenity::Column::Id)
                .into(),
        }
    }
}

impl Related<place::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Place.def()
    }
}

impl Related<amenity::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Amenity.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    pub fn link(place_id: impl Into<String>, amenity_id: impl Into<String>) -> Self {
        Self { place_id: place_id.into(), amenity_id: amenity_id.into() }
    }
}

/// Make the association rows of `place_id` exactly `amenity_ids`.
pub async fn replace_for_place<C: ConnectionTrait>(
    db: &C,
    place_id: &str,
    amenity_ids: &[String],
) -> Result<(), errors::ModelError> {
    delete_for_place(db, place_id).await?;
    let unique: BTreeSet<&String> = amenity_ids.iter().collect();
    if unique.is_empty() {
        return Ok(());
    }
    let rows = unique.into_iter().map(|amenity_id| ActiveModel {
        place_id: Set(place_id.to_string()),
        amenity_id: Set(amenity_id.clone()),
    });
    Entity::insert_many(rows)
        .exec_without_returning(db)
        .await
        .map_err(|e| errors::ModelError::Db(e.to_string()))?;
    Ok(())
}

pub async fn delete_for_place<C: ConnectionTrait>(db: &C, place_id: &str) -> Result<u64, errors::ModelError> {
    let res = Entity::delete_many()
        .filter(Column::PlaceId.eq(place_id))
        .exec(db)
        .await
        .map_err(|e| errors::ModelError::Db(e.to_string()))?;
    Ok(res.rows_affected)
}

pub async fn delete_for_amenity<C: ConnectionTrait>(db: &C, amenity_id: &str) -> Result<u64, errors::ModelError> {
    let res = Entity::delete_many()
        .filter(Column::AmenityId.eq(amenity_id))
        .exec(db)
        .await
        .map_err(|e| errors::ModelError::Db(e.to_string()))?;
    Ok(res.rows_affected)
}

/// Amenity ids linked to `place_id`, in id order.
pub async fn amenity_ids_for<C: ConnectionTrait>(db: &C, place_id: &str) -> Result<Vec<String>, errors::ModelError> {
    let rows = Entity::find()
        .filter(Column::PlaceId.eq(place_id))
        .order_by_asc(Column::AmenityId)
        .all(db)
        .await
        .map_err(|e| errors::ModelError::Db(e.to_string()))?;
    Ok(rows.into_iter().map(|r| r.amenity_id).collect())
}
