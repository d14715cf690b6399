use sea_orm::entity::prelude::*;
use sea_orm::{sea_query::OnConflict, ConnectionTrait, Set};
use serde::{Deserialize, Serialize};

use crate::{amenity, base, city, errors, place_amenity, review, user};

/// A listing, owned by a user and located in a city.
///
/// `amenity_ids` is not a column: relationally it lives in `place_amenity`,
/// in the JSON document it is stored inline.
#[derive(Clone, Debug, Default, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "places")]
#[serde(default)]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
    pub city_id: String,
    pub user_id: String,
    pub name: String,
    pub description: Option<String>,
    pub number_rooms: i32,
    pub number_bathrooms: i32,
    pub max_guest: i32,
    pub price_by_night: i32,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    #[sea_orm(ignore)]
    pub amenity_ids: Vec<String>,
}

#[derive(Copy, Clone, Debug, EnumIter)]
pub enum Relation {
    City,
    User,
    Reviews,
    PlaceAmenity,
}

impl RelationTrait for Relation {
    fn def(&self) -> RelationDef {
        match self {
            Relation::City => Entity::belongs_to(city::Entity)
                .from(Column::CityId)
                .to(city::Column::Id)
                .into(),
            Relation::User => Entity::belongs_to(user::Entity)
                .from(Column::UserId)
                .to(user::Column::Id)
                .into(),
            Relation::Reviews => Entity::has_many(review::Entity).into(),
            Relation::PlaceAmenity => Entity::has_many(place_amenity::Entity).into(),
        }
    }
}

impl Related<city::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::City.def()
    }
}

impl Related<user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::User.def()
    }
}

impl Related<review::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Reviews.def()
    }
}

impl Related<place_amenity::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::PlaceAmenity.def()
    }
}

impl Related<amenity::Entity> for Entity {
    fn to() -> RelationDef {
        place_amenity::Relation::Amenity.def()
    }

    fn via() -> Option<RelationDef> {
        Some(place_amenity::Relation::Place.def().rev())
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    pub fn new(name: impl Into<String>, city_id: impl Into<String>, user_id: impl Into<String>) -> Self {
        let now = base::now();
        Self {
            id: base::new_id(),
            created_at: now,
            updated_at: now,
            city_id: city_id.into(),
            user_id: user_id.into(),
            name: name.into(),
            ..Default::default()
        }
    }

    /// Link an amenity; linking the same amenity twice is a no-op.
    pub fn add_amenity(&mut self, amenity_id: impl Into<String>) {
        let amenity_id = amenity_id.into();
        if !self.amenity_ids.contains(&amenity_id) {
            self.amenity_ids.push(amenity_id);
        }
    }

    pub fn remove_amenity(&mut self, amenity_id: &str) {
        self.amenity_ids.retain(|a| a != amenity_id);
    }

    /// Association rows for the current amenity set.
    pub fn links(&self) -> Vec<place_amenity::Model> {
        self.amenity_ids
            .iter()
            .map(|amenity_id| place_amenity::Model::link(&self.id, amenity_id))
            .collect()
    }

    pub fn to_active(&self) -> ActiveModel {
        ActiveModel {
            id: Set(self.id.clone()),
            created_at: Set(self.created_at),
            updated_at: Set(self.updated_at),
            city_id: Set(self.city_id.clone()),
            user_id: Set(self.user_id.clone()),
            name: Set(self.name.clone()),
            description: Set(self.description.clone()),
            number_rooms: Set(self.number_rooms),
            number_bathrooms: Set(self.number_bathrooms),
            max_guest: Set(self.max_guest),
            price_by_night: Set(self.price_by_night),
            latitude: Set(self.latitude),
            longitude: Set(self.longitude),
        }
    }
}

/// Upsert the row and replace its association rows with `amenity_ids`.
pub async fn upsert<C: ConnectionTrait>(db: &C, model: &Model) -> Result<(), errors::ModelError> {
    Entity::insert(model.to_active())
        .on_conflict(
            OnConflict::column(Column::Id)
                .update_columns([
                    Column::UpdatedAt,
                    Column::CityId,
                    Column::UserId,
                    Column::Name,
                    Column::Description,
                    Column::NumberRooms,
                    Column::NumberBathrooms,
                    Column::MaxGuest,
                    Column::PriceByNight,
                    Column::Latitude,
                    Column::Longitude,
                ])
                .to_owned(),
        )
        .exec_without_returning(db)
        .await
        .map_err(|e| errors::ModelError::Db(e.to_string()))?;
    place_amenity::replace_for_place(db, &model.id, &model.amenity_ids).await
}
