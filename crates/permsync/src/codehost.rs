//! Code host capability consumed by the permission provider.
//!
//! [`CodeHostClient`] is the seam between the permission engine and a concrete
//! code host. The GitHub REST implementation lives in [`crate::github`]; tests
//! use hand-written fakes.
//!
//! # Example
//!
//! ```ignore
//! use permsync::codehost::{CodeHostClient, MAX_PER_PAGE, Visibility};
//!
//! async fn count_private(client: &dyn CodeHostClient) -> permsync::codehost::Result<usize> {
//!     let mut total = 0;
//!     let mut page = 1;
//!     loop {
//!         let p = client
//!             .list_affiliated_repositories(Visibility::Private, page, MAX_PER_PAGE, &[])
//!             .await?;
//!         total += p.items.len();
//!         if !p.has_next_page {
//!             return Ok(total);
//!         }
//!         page += 1;
//!     }
//! }
//! ```

mod auth;
mod client;
mod errors;
mod types;

pub use auth::{DEFAULT_REFRESH_BUFFER_MINUTES, OAuthBearerToken, RefreshedToken, TokenRefresher};
pub use client::{CodeHostClient, MAX_PER_PAGE};
pub use errors::{ClientError, Result, short_error_message};
pub use types::{
    AccountId, Collaborator, CollaboratorAffiliation, OrgDetails, OrgDetailsAndMembership,
    OrgMembership, OrgRef, Page, RepoId, RepoVisibility, Repository, RepositoryAffiliation, Team,
    Visibility,
};
