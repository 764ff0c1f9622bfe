//! Tool registry for the Mnemon gateway.
//!
//! A tool is a named, schema-typed capability an agent may invoke.  This
//! crate owns the mapping from tool name to declaration and the dispatch
//! path:
//!
//! - **[`spec`]** -- [`ToolSpec`], remote routes, and the [`LocalHandler`]
//!   trait local fallbacks implement.
//! - **[`registry`]** -- [`ToolRegistry`]: registration, schema validation,
//!   remote dispatch through the backend client, and local fallback on
//!   backend outage.
//! - **[`normalize`]** -- declared, name-scoped argument normalisers.
//! - **[`builtin`]** -- the static table of shipped tools.
//!
//! Registration happens at startup from [`builtin::install`]; afterwards the
//! registry is read-only in practice.

pub mod builtin;
pub mod error;
pub mod normalize;
pub mod registry;
pub mod spec;

pub use error::{Result, ToolError};
pub use normalize::Normalizer;
pub use registry::ToolRegistry;
pub use spec::{HttpMethod, LocalHandler, RemoteRoute, ToolSpec};
