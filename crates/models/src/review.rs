use sea_orm::entity::prelude::*;
use sea_orm::{sea_query::OnConflict, ConnectionTrait, Set};
use serde::{Deserialize, Serialize};

use crate::{base, errors, place, user};

#[derive(Clone, Debug, Default, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "reviews")]
#[serde(default)]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
    pub place_id: String,
    pub user_id: String,
    pub text: String,
}

#[derive(Copy, Clone, Debug, EnumIter)]
pub enum Relation {
    Place,
    User,
}

impl RelationTrait for Relation {
    fn def(&self) -> RelationDef {
        match self {
            Relation::Place => Entity::belongs_to(place::Entity)
                .from(Column::PlaceId)
                .to(place::Column::Id)
                .into(),
            Relation::User => Entity::belongs_to(user::Entity)
                .from(Column::UserId)
                .to(user::Column::Id)
                .into(),
        }
    }
}

impl Related<place::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Place.def()
    }
}

impl Related<user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::User.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    pub fn new(text: impl Into<String>, place_id: impl Into<String>, user_id: impl Into<String>) -> Self {
        let now = base::now();
        Self {
            id: base::new_id(),
            created_at: now,
            updated_at: now,
            place_id: place_id.into(),
            user_id: user_id.into(),
            text: text.into(),
        }
    }

    pub fn to_active(&self) -> ActiveModel {
        ActiveModel {
            id: Set(self.id.clone()),
            created_at: Set(self.created_at),
            updated_at: Set(self.updated_at),
            place_id: Set(self.place_id.clone()),
            user_id: Set(self.user_id.clone()),
            text: Set(self.text.clone()),
        }
    }
}

pub async fn upsert<C: ConnectionTrait>(db: &C, model: &Model) -> Result<(), errors::ModelError> {
    Entity::insert(model.to_active())
        .on_conflict(
            OnConflict::column(Column::Id)
                .update_columns([Column::UpdatedAt, Column::PlaceId, Column::UserId, Column::Text])
                .to_owned(),
        )
        .exec_without_returning(db)
        .await
        .map_err(|e| errors::ModelError::Db(e.to_string()))?;
    Ok(())
}
