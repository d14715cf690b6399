use argon2::{Argon2, password_hash::{PasswordHasher, PasswordVerifier, SaltString}, PasswordHash};
use rand::rngs::OsRng;
use sea_orm::entity::prelude::*;
use sea_orm::{sea_query::OnConflict, ConnectionTrait, Set};
use serde::{Deserialize, Serialize};

use crate::{base, errors, place, review};

/// An account. `password` always holds an argon2 PHC string.
#[derive(Clone, Debug, Default, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "users")]
#[serde(default)]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
    pub email: String,
    pub password: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

#[derive(Copy, Clone, Debug, EnumIter)]
pub enum Relation {
    Places,
    Reviews,
}

impl RelationTrait for Relation {
    fn def(&self) -> RelationDef {
        match self {
            Relation::Places => Entity::has_many(place::Entity).into(),
            Relation::Reviews => Entity::has_many(review::Entity).into(),
        }
    }
}

impl Related<place::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Places.def()
    }
}

impl Related<review::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Reviews.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

pub fn validate_email(email: &str) -> Result<(), errors::ModelError> {
    if !email.contains('@') {
        return Err(errors::ModelError::Validation("invalid email".into()));
    }
    Ok(())
}

impl Model {
    /// New account with a freshly hashed password.
    pub fn new(email: impl Into<String>, password: &str) -> Result<Self, errors::ModelError> {
        let email = email.into();
        validate_email(&email)?;
        let now = base::now();
        let mut user = Self {
            id: base::new_id(),
            created_at: now,
            updated_at: now,
            email,
            password: String::new(),
            first_name: None,
            last_name: None,
        };
        user.set_password(password)?;
        Ok(user)
    }

    pub fn with_name(mut self, first_name: impl Into<String>, last_name: impl Into<String>) -> Self {
        self.first_name = Some(first_name.into());
        self.last_name = Some(last_name.into());
        self
    }

    /// Replace the stored hash with an argon2 hash of `plain`.
    pub fn set_password(&mut self, plain: &str) -> Result<(), errors::ModelError> {
        if plain.is_empty() {
            return Err(errors::ModelError::Validation("password required".into()));
        }
        let salt = SaltString::generate(&mut OsRng);
        self.password = Argon2::default()
            .hash_password(plain.as_bytes(), &salt)
            .map_err(|e| errors::ModelError::Hash(e.to_string()))?
            .to_string();
        Ok(())
    }

    pub fn verify_password(&self, plain: &str) -> bool {
        match PasswordHash::new(&self.password) {
            Ok(parsed) => Argon2::default().verify_password(plain.as_bytes(), &parsed).is_ok(),
            Err(_) => false,
        }
    }

    pub fn to_active(&self) -> ActiveModel {
        ActiveModel {
            id: Set(self.id.clone()),
            created_at: Set(self.created_at),
            updated_at: Set(self.updated_at),
            email: Set(self.email.clone()),
            password: Set(self.password.clone()),
            first_name: Set(self.first_name.clone()),
            last_name: Set(self.last_name.clone()),
        }
    }
}

pub async fn upsert<C: ConnectionTrait>(db: &C, model: &Model) -> Result<(), errors::ModelError> {
    Entity::insert(model.to_active())
        .on_conflict(
            OnConflict::column(Column::Id)
                .update_columns([
                    Column::UpdatedAt,
                    Column::Email,
                    Column::Password,
                    Column::FirstName,
                    Column::LastName,
                ])
                .to_owned(),
        )
        .exec_without_returning(db)
        .await
        .map_err(|e| errors::ModelError::Db(e.to_string()))?;
    Ok(())
}
