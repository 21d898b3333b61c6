use super::{Eventual, Handler, HandlerResult, NormalizedRequest, NormalizedResponse};
use crate::error::GuardError;
use crate::response_validator::ResponseValidator;
use crate::security::{ComposedAuth, SecurityRequest};
use crate::spec::Operation;
use crate::uri_parsing::UriParser;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Everything compiled for one operation, bound to its business handler.
///
/// Built once (see [`crate::Api::bind`]) and shared across requests. Each call
/// runs parse, secure, handler and validate in that order, awaiting every
/// stage before the next. The handler never runs unless security passed.
#[derive(Debug)]
pub struct OperationHandler {
    operation: Arc<Operation>,
    parser: UriParser,
    security: ComposedAuth,
    validator: Option<ResponseValidator>,
    handler: Handler,
}

impl OperationHandler {
    pub fn new(
        operation: Arc<Operation>,
        parser: UriParser,
        security: ComposedAuth,
        validator: Option<ResponseValidator>,
        handler: Handler,
    ) -> Self {
        Self {
            operation,
            parser,
            security,
            validator,
            handler,
        }
    }

    pub fn operation(&self) -> &Operation {
        &self.operation
    }

    pub fn operation_id(&self) -> &str {
        &self.operation.operation_id
    }

    /// Mimetype used for responses that do not set their own
    pub fn mimetype(&self) -> &str {
        self.operation.mimetype()
    }

    pub fn parser(&self) -> &UriParser {
        &self.parser
    }

    pub fn security(&self) -> &ComposedAuth {
        &self.security
    }

    /// Parse parameters and run the security check.
    ///
    /// On success the request carries its normalized parameters and, when a
    /// verifier identified the caller, its security context.
    pub fn prepare(&self, req: &mut NormalizedRequest) -> Result<(), GuardError> {
        self.parser.parse_request(req);

        let outcome = self.security.authenticate(&SecurityRequest::from(&*req));
        match outcome {
            Ok(context) => {
                debug!(
                    request_id = %req.request_id,
                    operation_id = %self.operation.operation_id,
                    user = ?context.as_ref().and_then(|c| c.user.as_deref()),
                    "Security check passed"
                );
                req.security_context = context;
                Ok(())
            }
            Err(e) => {
                warn!(
                    request_id = %req.request_id,
                    operation_id = %self.operation.operation_id,
                    status = e.status().as_u16(),
                    detail = %e.detail(),
                    "Security check failed"
                );
                Err(e.into())
            }
        }
    }

    /// Run the whole pipeline.
    ///
    /// The result is ready immediately for blocking handlers and pending for
    /// suspending ones; either way callers may `.await` it or [`Eventual::wait`].
    pub fn invoke<'a>(&'a self, req: &'a mut NormalizedRequest) -> Eventual<'a, Result<NormalizedResponse, GuardError>> {
        let started = Instant::now();
        if let Err(e) = self.prepare(req) {
            return Eventual::Ready(Err(e));
        }

        debug!(
            request_id = %req.request_id,
            operation_id = %self.operation.operation_id,
            suspending = self.handler.is_suspending(),
            "Dispatching to handler"
        );
        if self.handler.is_suspending() {
            Eventual::pending(async move {
                let result = self.handler.invoke(req).resolve().await;
                self.finish(result, req, started)
            })
        } else {
            let result = self.handler.invoke(req).wait();
            Eventual::Ready(self.finish(result, req, started))
        }
    }

    /// Run the pipeline from async code
    pub async fn handle(&self, req: &mut NormalizedRequest) -> Result<NormalizedResponse, GuardError> {
        self.invoke(req).resolve().await
    }

    /// Run the pipeline on the current thread.
    ///
    /// Suspending handlers are driven by a local executor, so this must not be
    /// called from inside an async runtime worker when the handler suspends.
    pub fn handle_blocking(&self, req: &mut NormalizedRequest) -> Result<NormalizedResponse, GuardError> {
        self.invoke(req).wait()
    }

    fn finish(
        &self,
        result: HandlerResult,
        req: &NormalizedRequest,
        started: Instant,
    ) -> Result<NormalizedResponse, GuardError> {
        let response = result.map_err(|e| {
            error!(
                request_id = %req.request_id,
                operation_id = %self.operation.operation_id,
                error = %e,
                "Handler returned an error"
            );
            GuardError::Handler(e)
        })?;

        if let Some(validator) = &self.validator {
            validator.validate(&response, req)?;
        }

        info!(
            request_id = %req.request_id,
            operation_id = %self.operation.operation_id,
            status = response.status.as_u16(),
            execution_time_ms = started.elapsed().as_millis() as u64,
            "Request handled"
        );
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::{ParameterLocation, ParameterSpec};
    use crate::uri_parsing::UriParsingPolicy;
    use http::{Method, StatusCode};
    use serde_json::json;

    fn passthrough(handler: Handler) -> OperationHandler {
        let operation = Operation::new("get_item", Method::GET, "/items/{id}");
        let parser = UriParser::new(
            UriParsingPolicy::Swagger2,
            vec![ParameterSpec::new("id", ParameterLocation::Path).typed("integer")],
        );
        OperationHandler::new(Arc::new(operation), parser, ComposedAuth::Passthrough, None, handler)
    }

    #[test]
    fn test_blocking_pipeline_parses_before_handler() {
        let op = passthrough(Handler::blocking(|req| {
            Ok(NormalizedResponse::json(StatusCode::OK, json!({ "id": req.path_params["id"] })))
        }));
        let mut req = NormalizedRequest::new(Method::GET, "/items/7").path_param("id", "7");
        let resp = op.handle_blocking(&mut req).unwrap();
        assert_eq!(resp.status, StatusCode::OK);
        assert_eq!(req.path_params.get("id"), Some(&json!(7)));
    }

    #[test]
    fn test_rejected_request_never_reaches_handler() {
        let operation = Operation::new("get_item", Method::GET, "/items/{id}");
        let op = OperationHandler::new(
            Arc::new(operation),
            UriParser::new(UriParsingPolicy::Swagger2, Vec::new()),
            ComposedAuth::Alternatives(Vec::new()),
            None,
            Handler::blocking(|_req| panic!("handler must not run")),
        );
        let mut req = NormalizedRequest::new(Method::GET, "/items/7");
        let err = op.handle_blocking(&mut req).unwrap_err();
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn test_handler_error_is_wrapped() {
        let op = passthrough(Handler::blocking(|_req| Err(anyhow::anyhow!("db down"))));
        let mut req = NormalizedRequest::new(Method::GET, "/items/7").path_param("id", "7");
        assert!(matches!(op.handle_blocking(&mut req), Err(GuardError::Handler(_))));
    }
}
