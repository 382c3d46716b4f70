//! Re-export boundary over the shared domain crate.

pub use bedrock_audit_core::{compliance, contract, custom_resource, planning, state};
