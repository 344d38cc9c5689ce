//! Opsbench Library
//!
//! Role orchestrators and thin wrappers over the cloud services they drive:
//! Google Workspace, AWS Route53 and Netlify, plus local helpers for git
//! subtrees, Excel workbooks and PDF text.

pub mod credentials;
pub mod error;
pub mod orchestrators;
pub mod telemetry;
pub mod tools;

pub use credentials::{ConfigLoader, CredentialStore, Provider};
pub use error::ToolError;
