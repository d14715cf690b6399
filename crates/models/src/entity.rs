//! `AnyEntity`: one tagged value for every persisted kind, plus the
//! attribute-mapping conversions used on the wire and by the JSON document.

use std::hash::{Hash, Hasher};

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Map, Value};

use crate::kind::{EntityKind, ForeignKey, ObjectKey, Target};
use crate::{amenity, base, city, errors::ModelError, place, review, state, user};

/// Type discriminator key inside an attribute mapping.
pub const CLASS_KEY: &str = "__class__";

/// Attribute dropped from the wire mapping of a User.
const SECRET_KEYS: [&str; 1] = ["password"];

#[derive(Clone, Debug)]
pub enum AnyEntity {
    State(state::Model),
    City(city::Model),
    User(user::Model),
    Place(place::Model),
    Review(review::Model),
    Amenity(amenity::Model),
}

macro_rules! with_model {
    ($value:expr, $m:ident => $body:expr) => {
        match $value {
            AnyEntity::State($m) => $body,
            AnyEntity::City($m) => $body,
            AnyEntity::User($m) => $body,
            AnyEntity::Place($m) => $body,
            AnyEntity::Review($m) => $body,
            AnyEntity::Amenity($m) => $body,
        }
    };
}

impl AnyEntity {
    pub fn kind(&self) -> EntityKind {
        match self {
            AnyEntity::State(_) => EntityKind::State,
            AnyEntity::City(_) => EntityKind::City,
            AnyEntity::User(_) => EntityKind::User,
            AnyEntity::Place(_) => EntityKind::Place,
            AnyEntity::Review(_) => EntityKind::Review,
            AnyEntity::Amenity(_) => EntityKind::Amenity,
        }
    }

    pub fn id(&self) -> &str {
        with_model!(self, m => &m.id)
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        with_model!(self, m => m.created_at)
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        with_model!(self, m => m.updated_at)
    }

    pub fn key(&self) -> ObjectKey {
        ObjectKey::new(self.kind(), self.id())
    }

    /// Refresh `updated_at`; it always moves strictly forward.
    pub fn touch(&mut self) {
        with_model!(self, m => m.updated_at = base::next_update(m.created_at, m.updated_at))
    }

    /// Parent id held by this entity for `fk`, if `fk` applies to its kind.
    pub fn foreign_key(&self, fk: ForeignKey) -> Option<&str> {
        match (fk, self) {
            (ForeignKey::CityState, AnyEntity::City(c)) => Some(&c.state_id),
            (ForeignKey::PlaceCity, AnyEntity::Place(p)) => Some(&p.city_id),
            (ForeignKey::PlaceUser, AnyEntity::Place(p)) => Some(&p.user_id),
            (ForeignKey::ReviewPlace, AnyEntity::Review(r)) => Some(&r.place_id),
            (ForeignKey::ReviewUser, AnyEntity::Review(r)) => Some(&r.user_id),
            _ => None,
        }
    }

    /// Every attribute plus `__class__`, as stored in the JSON document.
    pub fn to_document(&self) -> Result<Map<String, Value>, ModelError> {
        let value = with_model!(self, m => serde_json::to_value(m)?);
        let Value::Object(mut map) = value else {
            return Err(ModelError::Mapping(format!("{} did not serialize to an object", self.key())));
        };
        map.insert(CLASS_KEY.to_string(), Value::String(self.kind().name().to_string()));
        Ok(map)
    }

    /// Wire mapping: like [`to_document`](Self::to_document) without secrets.
    pub fn to_mapping(&self) -> Result<Map<String, Value>, ModelError> {
        let mut map = self.to_document()?;
        if self.kind() == EntityKind::User {
            for key in SECRET_KEYS {
                map.remove(key);
            }
        }
        Ok(map)
    }

    /// Rehydrate from a mapping carrying its own `__class__`.
    pub fn from_mapping(map: Map<String, Value>) -> Result<Self, ModelError> {
        let class = map
            .get(CLASS_KEY)
            .and_then(Value::as_str)
            .ok_or_else(|| ModelError::Mapping(format!("missing `{CLASS_KEY}`")))?;
        let kind: EntityKind = class.parse()?;
        Self::from_mapping_as(kind, map)
    }

    /// Rehydrate as `kind`. `id`, `created_at` and `updated_at` are kept
    /// verbatim when present and generated only when absent.
    pub fn from_mapping_as(kind: EntityKind, mut map: Map<String, Value>) -> Result<Self, ModelError> {
        if let Some(class) = map.remove(CLASS_KEY) {
            if class.as_str() != Some(kind.name()) {
                return Err(ModelError::Mapping(format!("`{CLASS_KEY}` is {class}, expected {kind}")));
            }
        }
        let now = Value::String(base::now().to_rfc3339_opts(SecondsFormat::Micros, true));
        map.entry("id").or_insert_with(|| Value::String(base::new_id()));
        let created = map.entry("created_at").or_insert(now).clone();
        map.entry("updated_at").or_insert(created);

        let value = Value::Object(map);
        let entity = match kind {
            EntityKind::State => AnyEntity::State(serde_json::from_value(value)?),
            EntityKind::City => AnyEntity::City(serde_json::from_value(value)?),
            EntityKind::User => AnyEntity::User(serde_json::from_value(value)?),
            EntityKind::Place => AnyEntity::Place(serde_json::from_value(value)?),
            EntityKind::Review => AnyEntity::Review(serde_json::from_value(value)?),
            EntityKind::Amenity => AnyEntity::Amenity(serde_json::from_value(value)?),
        };
        if entity.id().is_empty() {
            return Err(ModelError::Mapping(format!("{kind} mapping has an empty id")));
        }
        if entity.updated_at() < entity.created_at() {
            return Err(ModelError::Mapping(format!("{} has updated_at before created_at", entity.key())));
        }
        Ok(entity)
    }
}

/// Identity equality: same kind and same id, attributes ignored.
impl PartialEq for AnyEntity {
    fn eq(&self, other: &Self) -> bool {
        self.kind() == other.kind() && self.id() == other.id()
    }
}

impl Eq for AnyEntity {}

impl Hash for AnyEntity {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.kind().hash(state);
        self.id().hash(state);
    }
}

/// Implemented by every concrete model so callers can stay typed.
pub trait Persisted: Clone + Into<AnyEntity> {
    const KIND: EntityKind;

    fn id(&self) -> &str;

    fn from_any(entity: AnyEntity) -> Option<Self>;

    fn key(&self) -> ObjectKey {
        ObjectKey::new(Self::KIND, self.id())
    }
}

macro_rules! persisted {
    ($variant:ident, $module:ident) => {
        impl From<$module::Model> for AnyEntity {
            fn from(model: $module::Model) -> Self {
                AnyEntity::$variant(model)
            }
        }

        impl Persisted for $module::Model {
            const KIND: EntityKind = EntityKind::$variant;

            fn id(&self) -> &str {
                &self.id
            }

            fn from_any(entity: AnyEntity) -> Option<Self> {
                match entity {
                    AnyEntity::$variant(model) => Some(model),
                    _ => None,
                }
            }
        }
    };
}

persisted!(State, state);
persisted!(City, city);
persisted!(User, user);
persisted!(Place, place);
persisted!(Review, review);
persisted!(Amenity, amenity);

impl From<&AnyEntity> for Target {
    fn from(entity: &AnyEntity) -> Self {
        Target::Key(entity.key())
    }
}

impl<T: Persisted> From<&T> for Target {
    fn from(model: &T) -> Self {
        Target::Key(model.key())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn construction_assigns_identity_and_equal_timestamps() {
        let s = state::Model::new("California");
        assert!(!s.id.is_empty());
        assert_eq!(s.created_at, s.updated_at);
        let other = state::Model::new("California");
        assert_ne!(s.id, other.id);
    }

    #[test]
    fn equality_is_by_kind_and_id() {
        let s = state::Model::new("California");
        let mut renamed = s.clone();
        renamed.name = "Nevada".into();
        assert_eq!(AnyEntity::from(s.clone()), AnyEntity::from(renamed));

        // same id, different kind
        let mut amenity = amenity::Model::new("California");
        amenity.id = s.id.clone();
        assert_ne!(AnyEntity::from(s), AnyEntity::from(amenity));
    }

    #[test]
    fn mapping_carries_class_and_base_fields() {
        let city = city::Model::new("San Francisco", "state-1");
        let map = AnyEntity::from(city.clone()).to_mapping().unwrap();
        assert_eq!(map[CLASS_KEY], json!("City"));
        assert_eq!(map["id"], json!(city.id));
        assert_eq!(map["state_id"], json!("state-1"));
        assert!(map.contains_key("created_at"));
        assert!(map.contains_key("updated_at"));
    }

    #[test]
    fn rehydration_keeps_id_and_timestamps() {
        let mut place = place::Model::new("Loft", "city-1", "user-1");
        place.add_amenity("amenity-1");
        place.latitude = Some(37.77);
        let original = AnyEntity::from(place.clone());
        let back = AnyEntity::from_mapping(original.to_document().unwrap()).unwrap();

        let back = place::Model::from_any(back).unwrap();
        assert_eq!(back, place);
    }

    #[test]
    fn partial_mapping_gets_fresh_identity() {
        let mut map = Map::new();
        map.insert("name".into(), json!("Wifi"));
        let entity = AnyEntity::from_mapping_as(EntityKind::Amenity, map).unwrap();
        assert_eq!(entity.kind(), EntityKind::Amenity);
        assert!(!entity.id().is_empty());
        assert_eq!(entity.created_at(), entity.updated_at());
    }

    #[test]
    fn wire_mapping_hides_password_but_document_keeps_it() {
        let user = user::Model::new("a@b.com", "secret").unwrap();
        let entity = AnyEntity::from(user);
        assert!(!entity.to_mapping().unwrap().contains_key("password"));
        assert!(entity.to_document().unwrap().contains_key("password"));
    }

    #[test]
    fn mismatched_or_missing_class_is_rejected() {
        let doc = AnyEntity::from(state::Model::new("Texas")).to_document().unwrap();
        assert!(AnyEntity::from_mapping_as(EntityKind::City, doc).is_err());

        let mut map = Map::new();
        map.insert("name".into(), json!("x"));
        assert!(AnyEntity::from_mapping(map).is_err());
    }

    #[test]
    fn touch_moves_updated_at_forward_only() {
        let mut entity = AnyEntity::from(review::Model::new("great", "p", "u"));
        let created = entity.created_at();
        let before = entity.updated_at();
        entity.touch();
        assert!(entity.updated_at() > before);
        assert_eq!(entity.created_at(), created);
    }

    #[test]
    fn foreign_keys_resolve_per_kind() {
        let review = AnyEntity::from(review::Model::new("ok", "place-9", "user-3"));
        assert_eq!(review.foreign_key(ForeignKey::ReviewPlace), Some("place-9"));
        assert_eq!(review.foreign_key(ForeignKey::ReviewUser), Some("user-3"));
        assert_eq!(review.foreign_key(ForeignKey::CityState), None);
    }

    #[test]
    fn delete_targets_from_models() {
        let state = state::Model::new("Oregon");
        let target = Target::from(&state);
        assert_eq!(target, Target::Key(ObjectKey::new(EntityKind::State, state.id.clone())));
        assert_eq!(Target::from("abc"), Target::Id("abc".into()));
    }
}
