//! Heliopause - access control engine for secret storage
//!
//! This library compiles declarative path policies into an immutable ACL
//! and answers per-request authorization queries against it. It exposes all
//! modules for testing purposes.

pub mod acl;
pub mod settings;
