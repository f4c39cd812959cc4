//! GitHub REST implementation of [`CodeHostClient`](crate::codehost::CodeHostClient).
//!
//! - [`GitHubClient`] - request plumbing and the endpoint mapping
//! - [`parse_link_header`] - `Link` header pagination
//! - [`ApiRateLimiter`] and [`exhausted_until`] - request pacing and rate limit detection
//!
//! ```ignore
//! use permsync::github::GitHubClient;
//!
//! let client = GitHubClient::with_reqwest(None, std::time::Duration::from_secs(30))?
//!     .with_requests_per_second(10);
//! ```

mod client;
mod links;
mod rate_limit;

pub use client::{DEFAULT_API_ROOT, GitHubClient, api_root_for};
pub use links::{LinkPagination, parse_link_header};
pub use rate_limit::{ApiRateLimiter, GITHUB_DEFAULT_RPS, exhausted_until};
