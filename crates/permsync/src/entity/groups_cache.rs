//! GroupsCache entity - persisted entries of the groups cache.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "groups_cache")]
pub struct Model {
    /// Namespaced key, e.g. `gh_groups_perms:https://github.com/:github:v2/acme/core`.
    #[sea_orm(primary_key, auto_increment = false)]
    pub cache_key: String,

    /// Opaque payload (a JSON-encoded group).
    pub value: Vec<u8>,

    /// Entries past this instant are treated as absent.
    pub expires_at: DateTimeWithTimeZone,

    pub cached_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
