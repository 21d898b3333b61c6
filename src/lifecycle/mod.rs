//! # Lifecycle Module
//!
//! The per-request pipeline wrapped around a business handler.
//!
//! ## Stages
//!
//! ```text
//! native request
//!   -> FrameworkAdapter::get_request   NormalizedRequest
//!   -> UriParser::parse_request        path_params / query / form / header_params
//!   -> ComposedAuth::authenticate      security_context (or 401/403)
//!   -> Handler::invoke                 NormalizedResponse
//!   -> ResponseValidator::validate     schema, required headers, ownership
//!   -> FrameworkAdapter::get_response  native response
//! ```
//!
//! Each stage completes before the next starts and there is no implicit
//! concurrency. Business handlers are either blocking or suspending
//! ([`Handler`]); both are run through [`Eventual`], so the same pipeline
//! serves async and blocking callers.

mod decorator;
mod eventual;
mod handler;
mod operation;
mod request;
mod response;

pub use decorator::RequestResponseDecorator;
pub use eventual::Eventual;
pub use handler::{Handler, HandlerResult};
pub use operation::OperationHandler;
pub use request::NormalizedRequest;
pub use response::{NormalizedResponse, ResponseBody};
