use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque code host identifier of a repository (GitHub GraphQL node ID).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RepoId(pub String);

/// Code host identifier of a user account (GitHub database ID, in decimal).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(pub String);

macro_rules! string_id {
    ($ty:ident) => {
        impl $ty {
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $ty {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl From<String> for $ty {
            fn from(s: String) -> Self {
                Self(s)
            }
        }
    };
}

string_id!(RepoId);
string_id!(AccountId);

impl AccountId {
    /// Build an account ID from a numeric database ID.
    pub fn from_database_id(id: i64) -> Self {
        Self(id.to_string())
    }
}

/// One page of a paginated listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Whether the code host advertised another page.
    pub has_next_page: bool,
    /// Rate limit cost reported for producing this page. Informational only.
    pub cost: u32,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, has_next_page: bool, cost: u32) -> Self {
        Self {
            items,
            has_next_page,
            cost,
        }
    }

    /// A final page.
    pub fn last(items: Vec<T>) -> Self {
        Self::new(items, false, 1)
    }
}

/// How a user relates to a repository when listing affiliated repositories.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepositoryAffiliation {
    Owner,
    Collaborator,
    OrganizationMember,
}

impl RepositoryAffiliation {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Owner => "owner",
            Self::Collaborator => "collaborator",
            Self::OrganizationMember => "organization_member",
        }
    }
}

/// Affiliation filter for repository collaborator listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollaboratorAffiliation {
    Direct,
    Outside,
}

impl CollaboratorAffiliation {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Direct => "direct",
            Self::Outside => "outside",
        }
    }
}

/// Visibility filter for affiliated repository listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    All,
    Public,
    Private,
}

impl Visibility {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::All => "all",
            Self::Public => "public",
            Self::Private => "private",
        }
    }
}

/// Visibility of a single repository as reported by the code host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepoVisibility {
    Public,
    Private,
    Internal,
}

/// A repository as returned by listing and lookup endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Repository {
    #[serde(rename = "node_id")]
    pub id: RepoId,
    #[serde(rename = "id")]
    pub database_id: i64,
    pub full_name: String,
    #[serde(default)]
    pub private: bool,
    #[serde(default)]
    pub visibility: Option<RepoVisibility>,
}

/// A user with access to a repository, organization or team.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Collaborator {
    #[serde(rename = "id")]
    pub database_id: i64,
    pub login: String,
}

impl Collaborator {
    pub fn account_id(&self) -> AccountId {
        AccountId::from_database_id(self.database_id)
    }
}

/// Minimal organization reference embedded in team payloads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrgRef {
    pub login: String,
}

/// A team within an organization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Team {
    pub slug: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub repos_count: i64,
    #[serde(default)]
    pub organization: Option<OrgRef>,
}

/// Organization settings relevant to access decisions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrgDetails {
    pub login: String,
    /// One of `read`, `write`, `admin` or `none`. Only visible to members.
    #[serde(default)]
    pub default_repository_permission: Option<String>,
}

impl OrgDetails {
    /// Whether every member of the organization can read every repository.
    pub fn grants_members_read(&self) -> bool {
        matches!(
            self.default_repository_permission.as_deref(),
            Some("read" | "write" | "admin")
        )
    }
}

/// The authenticated user's membership in an organization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrgMembership {
    pub state: String,
    pub role: String,
}

/// An organization together with the authenticated user's membership in it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrgDetailsAndMembership {
    pub details: Option<OrgDetails>,
    pub membership: Option<OrgMembership>,
}

impl OrgDetailsAndMembership {
    pub fn login(&self) -> Option<&str> {
        self.details.as_ref().map(|d| d.login.as_str())
    }

    /// Whether the authenticated user can see every repository of this organization.
    ///
    /// Active admins always can; otherwise the default repository permission decides.
    pub fn can_view_all_repos(&self) -> bool {
        if let Some(m) = &self.membership
            && m.state == "active"
            && m.role == "admin"
        {
            return true;
        }
        self.details
            .as_ref()
            .is_some_and(OrgDetails::grants_members_read)
    }
}
