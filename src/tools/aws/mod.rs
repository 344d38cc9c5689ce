//! AWS tools
//!
//! Route53 DNS management through the AWS SDK.

pub mod route53;

pub use route53::{HttpRoute53, Route53Api, Route53Client};
