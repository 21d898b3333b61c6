//! # Spec Module
//!
//! Loads Swagger 2.0 and OpenAPI 3.x documents and turns every `(path, method)`
//! pair into an [`Operation`]: its parameters, security requirement, response
//! definitions and produced mimetypes.
//!
//! The documents are walked untyped (`serde_json::Value`) so both versions share
//! one code path. Local `$ref`s are resolved while building.

mod build;
mod load;
mod types;

pub use build::*;
pub use load::*;
pub use types::*;
