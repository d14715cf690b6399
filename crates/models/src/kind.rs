//! The closed set of persisted kinds and the keys built from them.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::ModelError;

/// Every entity type the storage layer knows about.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EntityKind {
    State,
    City,
    User,
    Place,
    Review,
    Amenity,
}

impl EntityKind {
    pub const ALL: [EntityKind; 6] = [
        EntityKind::State,
        EntityKind::City,
        EntityKind::User,
        EntityKind::Place,
        EntityKind::Review,
        EntityKind::Amenity,
    ];

    /// Type discriminator used in composite keys and in `__class__`.
    pub fn name(self) -> &'static str {
        match self {
            EntityKind::State => "State",
            EntityKind::City => "City",
            EntityKind::User => "User",
            EntityKind::Place => "Place",
            EntityKind::Review => "Review",
            EntityKind::Amenity => "Amenity",
        }
    }

    pub fn table_name(self) -> &'static str {
        match self {
            EntityKind::State => "states",
            EntityKind::City => "cities",
            EntityKind::User => "users",
            EntityKind::Place => "places",
            EntityKind::Review => "reviews",
            EntityKind::Amenity => "amenities",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for EntityKind {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EntityKind::ALL
            .into_iter()
            .find(|k| k.name() == s)
            .ok_or_else(|| ModelError::UnknownKind(s.to_string()))
    }
}

/// Singular relationships, named child-then-parent.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ForeignKey {
    CityState,
    PlaceCity,
    PlaceUser,
    ReviewPlace,
    ReviewUser,
}

impl ForeignKey {
    pub const ALL: [ForeignKey; 5] = [
        ForeignKey::CityState,
        ForeignKey::PlaceCity,
        ForeignKey::PlaceUser,
        ForeignKey::ReviewPlace,
        ForeignKey::ReviewUser,
    ];

    pub fn child(self) -> EntityKind {
        match self {
            ForeignKey::CityState => EntityKind::City,
            ForeignKey::PlaceCity | ForeignKey::PlaceUser => EntityKind::Place,
            ForeignKey::ReviewPlace | ForeignKey::ReviewUser => EntityKind::Review,
        }
    }

    pub fn parent(self) -> EntityKind {
        match self {
            ForeignKey::CityState => EntityKind::State,
            ForeignKey::PlaceCity => EntityKind::City,
            ForeignKey::PlaceUser | ForeignKey::ReviewUser => EntityKind::User,
            ForeignKey::ReviewPlace => EntityKind::Place,
        }
    }

    /// Column / attribute holding the parent id on the child.
    pub fn column(self) -> &'static str {
        match self {
            ForeignKey::CityState => "state_id",
            ForeignKey::PlaceCity => "city_id",
            ForeignKey::PlaceUser | ForeignKey::ReviewUser => "user_id",
            ForeignKey::ReviewPlace => "place_id",
        }
    }
}

/// Composite key `Kind.id`, unique across the whole store.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectKey {
    pub kind: EntityKind,
    pub id: String,
}

impl ObjectKey {
    pub fn new(kind: EntityKind, id: impl Into<String>) -> Self {
        Self { kind, id: id.into() }
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.kind, self.id)
    }
}

impl FromStr for ObjectKey {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (kind, id) = s
            .split_once('.')
            .ok_or_else(|| ModelError::Mapping(format!("key `{s}` is not of the form Kind.id")))?;
        if id.is_empty() {
            return Err(ModelError::Mapping(format!("key `{s}` has an empty id")));
        }
        Ok(ObjectKey::new(kind.parse()?, id))
    }
}

/// What a delete call refers to: a typed key, or a bare identifier that is
/// looked up across every kind.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Target {
    Key(ObjectKey),
    Id(String),
}

impl From<ObjectKey> for Target {
    fn from(key: ObjectKey) -> Self {
        Target::Key(key)
    }
}

impl From<&str> for Target {
    fn from(id: &str) -> Self {
        Target::Id(id.to_string())
    }
}

impl From<String> for Target {
    fn from(id: String) -> Self {
        Target::Id(id)
    }
}
