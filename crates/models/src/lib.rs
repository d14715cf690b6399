//! Entity definitions for the hbnb domain: the sea-orm models backing the
//! relational engine, and the `AnyEntity` view used by the file engine.

pub mod errors;
pub mod base;
pub mod kind;
pub mod entity;
pub mod state;
pub mod city;
pub mod user;
pub mod place;
pub mod review;
pub mod amenity;
pub mod place_amenity;

pub use entity::{AnyEntity, Persisted, CLASS_KEY};
pub use errors::ModelError;
pub use kind::{EntityKind, ForeignKey, ObjectKey, Target};
