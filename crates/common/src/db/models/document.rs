//! Document entity

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Kind of named entity recognised in document text.
///
/// The upper-case names are the persisted representation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EntityType {
    Person,
    Org,
    Location,
}

impl EntityType {
    pub const ALL: [EntityType; 3] = [EntityType::Person, EntityType::Org, EntityType::Location];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Person => "PERSON",
            EntityType::Org => "ORG",
            EntityType::Location => "LOCATION",
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PERSON" => Ok(EntityType::Person),
            "ORG" => Ok(EntityType::Org),
            "LOCATION" => Ok(EntityType::Location),
            other => Err(format!("unknown entity type: {}", other)),
        }
    }
}

/// A `{text, type}` pair found in a document
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedEntity {
    pub text: String,
    #[serde(rename = "type")]
    pub entity_type: EntityType,
}

impl NamedEntity {
    pub fn new(text: impl Into<String>, entity_type: EntityType) -> Self {
        Self { text: text.into(), entity_type }
    }
}

/// Ordered entity list stored as a JSONB array
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, sea_orm::FromJsonQueryResult)]
pub struct EntityList(pub Vec<NamedEntity>);

impl EntityList {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<NamedEntity>> for EntityList {
    fn from(entities: Vec<NamedEntity>) -> Self {
        Self(entities)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "documents")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Original filename
    #[sea_orm(column_type = "Text")]
    pub title: String,

    /// Address of the stored binary
    #[sea_orm(column_type = "Text")]
    pub storage_url: String,

    /// Provider-assigned id of the stored binary
    #[sea_orm(column_type = "Text")]
    pub storage_id: String,

    #[sea_orm(column_type = "Text", nullable)]
    pub raw_text: Option<String>,

    #[sea_orm(column_type = "Text", nullable)]
    pub cleaned_text: Option<String>,

    #[sea_orm(column_type = "JsonBinary")]
    pub entities: EntityList,

    pub owner_id: Uuid,

    pub created_at: DateTimeWithTimeZone,

    pub updated_at: DateTimeWithTimeZone,
}

impl Model {
    /// Whether the given user may see this document
    pub fn is_owned_by(&self, user_id: Uuid) -> bool {
        self.owner_id == user_id
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::OwnerId",
        to = "super::user::Column::Id",
        on_delete = "Cascade"
    )]
    Owner,
}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Owner.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_json_layout() {
        let list = EntityList(vec![
            NamedEntity::new("Ada Lovelace", EntityType::Person),
            NamedEntity::new("Analytical Society", EntityType::Org),
            NamedEntity::new("London", EntityType::Location),
        ]);

        let json = serde_json::to_value(&list).unwrap();
        assert_eq!(
            json,
            serde_json::json!([
                {"text": "Ada Lovelace", "type": "PERSON"},
                {"text": "Analytical Society", "type": "ORG"},
                {"text": "London", "type": "LOCATION"},
            ])
        );

        let back: EntityList = serde_json::from_value(json).unwrap();
        assert_eq!(back, list);
    }

    #[test]
    fn test_unknown_entity_type_rejected() {
        let parsed = serde_json::from_str::<NamedEntity>(r#"{"text": "Monday", "type": "DATE"}"#);
        assert!(parsed.is_err());
        assert!("DATE".parse::<EntityType>().is_err());
        assert_eq!("ORG".parse::<EntityType>().unwrap(), EntityType::Org);
    }
}
