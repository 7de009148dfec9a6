//! Source resolution: turn a source string (git repository, HTTP archive,
//! OCI artifact or local directory) into a local content directory plus the
//! provenance needed to find it again.

pub mod archive;
pub mod error;
pub mod git;
pub mod http;
pub mod local;
pub mod oci;
pub mod resolve;
pub mod types;

pub use {
    error::{Error, Result},
    resolve::{Resolvers, SourceSpec, resolve_source},
    types::{ArchiveLimits, ResolveOptions, ResolvedSource, SourceType},
};
