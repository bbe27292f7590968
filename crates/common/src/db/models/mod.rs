//! SeaORM entity models
//!
//! Database entities for DeepSearch

mod document;
mod user;

pub use document::{
    Entity as DocumentEntity,
    Model as Document,
    ActiveModel as DocumentActiveModel,
    Column as DocumentColumn,
    EntityList,
    EntityType,
    NamedEntity,
};

pub use user::{
    Entity as UserEntity,
    Model as User,
    ActiveModel as UserActiveModel,
    Column as UserColumn,
};
