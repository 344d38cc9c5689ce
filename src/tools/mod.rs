//! Provider Tools
//!
//! Thin wrappers over external services and local file formats. Clients
//! resolve their credentials through [`crate::credentials::CredentialStore`]
//! and fail with a configuration hint when mandatory values are missing.

pub mod aws;
pub mod excel;
pub mod git;
pub mod google;
pub mod netlify;
pub mod pdf;

pub use aws::Route53Client;
pub use git::GitRepo;
pub use netlify::NetlifyClient;
