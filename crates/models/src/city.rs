use sea_orm::entity::prelude::*;
use sea_orm::{sea_query::OnConflict, ConnectionTrait, Set};
use serde::{Deserialize, Serialize};

use crate::{base, errors, place, state};

/// A sub-location inside a state. Owns many places.
#[derive(Clone, Debug, Default, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "cities")]
#[serde(default)]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
    pub name: String,
    pub state_id: String,
}

#[derive(Copy, Clone, Debug, EnumIter)]
pub enum Relation {
    State,
    Places,
}

impl RelationTrait for Relation {
    fn def(&self) -> RelationDef {
        match self {
            Relation::State => Entity::belongs_to(state::Entity)
                .from(Column::StateId)
                .to(state::Column::Id)
                .into(),
            Relation::Places => Entity::has_many(place::Entity).into(),
        }
    }
}

impl Related<state::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::State.def()
    }
}

impl Related<place::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Places.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    pub fn new(name: impl Into<String>, state_id: impl Into<String>) -> Self {
        let now = base::now();
        Self {
            id: base::new_id(),
            created_at: now,
            updated_at: now,
            name: name.into(),
            state_id: state_id.into(),
        }
    }

    pub fn to_active(&self) -> ActiveModel {
        ActiveModel {
            id: Set(self.id.clone()),
            created_at: Set(self.created_at),
            updated_at: Set(self.updated_at),
            name: Set(self.name.clone()),
            state_id: Set(self.state_id.clone()),
        }
    }
}

pub async fn upsert<C: ConnectionTrait>(db: &C, model: &Model) -> Result<(), errors::ModelError> {
    Entity::insert(model.to_active())
        .on_conflict(
            OnConflict::column(Column::Id)
                .update_columns([Column::UpdatedAt, Column::Name, Column::StateId])
                .to_owned(),
        )
        .exec_without_returning(db)
        .await
        .map_err(|e| errors::ModelError::Db(e.to_string()))?;
    Ok(())
}
