#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
//! Request-scoped security state for the tenant-aware data-access layer.
//!
//! A [`RequestContext`] is built by the authentication layer once per inbound
//! request and passed explicitly down to every data-access call. It is never
//! stored in a global and never shared between concurrent requests.
pub mod access_scope;
pub mod context;
pub mod permission;

pub use access_scope::AccessScope;
pub use context::{ContextError, RequestContext, RequestContextBuilder};
pub use permission::Permission;
