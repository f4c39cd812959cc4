//! PermissionState entity - the last synced permissions of a user or repository.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Which side of the permission relation a row describes.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::None)")]
#[serde(rename_all = "lowercase")]
pub enum SubjectType {
    #[sea_orm(string_value = "user")]
    User,
    #[sea_orm(string_value = "repo")]
    Repo,
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "permission_states")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    pub subject_type: SubjectType,
    pub subject_id: i32,

    /// Code host IDs this subject maps to: repository IDs for a user,
    /// account IDs for a repository.
    pub object_ids: Json,

    /// `None` until the first successful sync.
    pub synced_at: Option<DateTimeWithTimeZone>,

    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
