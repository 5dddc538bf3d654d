//! On-demand unit materialization: two-tier unit storage, per-name rewrite
//! passes, content-addressed caching, and single-flight coordination.
//!
//! The entry point is [`UnitLoader`]: it routes a requested unit name to
//! either the owned namespace (materialized through the rewrite pipeline,
//! exactly once per name) or an injected delegate resolver, and exposes a
//! layered resource lookup over synthesized, directory-backed, and delegate
//! resources.

#![warn(missing_docs)]

pub mod config;
pub mod delegate;
pub mod error;
pub mod loader;
pub mod materialize;
pub mod pipeline;
pub mod store;

pub use config::{load_config, load_config_from_str, LoaderConfig};
pub use delegate::{DelegateResolver, NoDelegate};
pub use error::{ConfigError, MaterializeError};
pub use loader::{Route, UnitLoader};
pub use materialize::{Materializer, Outcome};
pub use pipeline::{RewritePass, RewritePipeline};
pub use store::{Provenance, RawUnit, UnitStore};
