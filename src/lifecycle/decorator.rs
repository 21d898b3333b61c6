use super::OperationHandler;
use crate::adapter::FrameworkAdapter;
use std::sync::Arc;
use tracing::debug;

/// Wraps an [`OperationHandler`] with a framework adapter.
///
/// Converts the native request, runs the pipeline and converts the result
/// back. Any [`crate::GuardError`] along the way is rendered by
/// [`FrameworkAdapter::error_response`], so callers always get a native
/// response.
pub struct RequestResponseDecorator<A: FrameworkAdapter> {
    adapter: Arc<A>,
    handler: Arc<OperationHandler>,
}

impl<A: FrameworkAdapter> Clone for RequestResponseDecorator<A> {
    fn clone(&self) -> Self {
        Self {
            adapter: Arc::clone(&self.adapter),
            handler: Arc::clone(&self.handler),
        }
    }
}

impl<A: FrameworkAdapter> std::fmt::Debug for RequestResponseDecorator<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestResponseDecorator")
            .field("operation_id", &self.handler.operation_id())
            .finish_non_exhaustive()
    }
}

impl<A: FrameworkAdapter> RequestResponseDecorator<A> {
    pub fn new(adapter: Arc<A>, handler: Arc<OperationHandler>) -> Self {
        Self { adapter, handler }
    }

    pub fn handler(&self) -> &OperationHandler {
        &self.handler
    }

    /// Handle one native request from async code
    pub async fn call(&self, native: A::Request) -> A::Response {
        let mut req = match self.adapter.get_request(native).resolve().await {
            Ok(req) => req,
            Err(e) => return self.adapter.error_response(&e, None),
        };
        debug!(
            request_id = %req.request_id,
            operation_id = %self.handler.operation_id(),
            "Request converted"
        );

        let response = match self.handler.handle(&mut req).await {
            Ok(response) => response,
            Err(e) => return self.adapter.error_response(&e, Some(&req)),
        };
        match self
            .adapter
            .get_response(response, self.handler.mimetype(), &req)
            .resolve()
            .await
        {
            Ok(native) => native,
            Err(e) => self.adapter.error_response(&e, Some(&req)),
        }
    }

    /// Handle one native request on the current thread
    pub fn call_blocking(&self, native: A::Request) -> A::Response {
        let mut req = match self.adapter.get_request(native).wait() {
            Ok(req) => req,
            Err(e) => return self.adapter.error_response(&e, None),
        };
        let response = match self.handler.handle_blocking(&mut req) {
            Ok(response) => response,
            Err(e) => return self.adapter.error_response(&e, Some(&req)),
        };
        match self
            .adapter
            .get_response(response, self.handler.mimetype(), &req)
            .wait()
        {
            Ok(native) => native,
            Err(e) => self.adapter.error_response(&e, Some(&req)),
        }
    }
}
