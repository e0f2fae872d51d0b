use http::header::{HeaderValue, ALLOW};
use http::StatusCode;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

use super::response::{error_response, from_exchange, render, status_response, ResponseDescriptor};
use crate::binder::{CallContext, HandlerDescriptor, Invoker, RequestInputs};
use crate::error::DispatchError;
use crate::exchange::{carries_body, parse_cookies, AppContext, Exchange, Request};
use crate::filter::{run_chain, ChainOutcome};
use crate::ids::RequestId;
use crate::mime::MimeTable;
use crate::multipart::{is_multipart, MultipartParser, Parts};
use crate::router::{Resolution, Router};
use crate::runtime_config::RuntimeConfig;

/// Request dispatcher: route, parse, bind, filter, invoke, render.
///
/// Built once by [`crate::registry::Registry::into_dispatcher`] and shared
/// read-only across requests. Each call to [`Dispatcher::dispatch`] runs
/// strictly sequentially on the caller's thread.
pub struct Dispatcher {
    router: Router<HandlerDescriptor>,
    invoker: Invoker,
    config: RuntimeConfig,
    mime: MimeTable,
    context: Arc<AppContext>,
}

impl Dispatcher {
    pub(crate) fn new(
        router: Router<HandlerDescriptor>,
        invoker: Invoker,
        config: RuntimeConfig,
        mime: MimeTable,
        context: Arc<AppContext>,
    ) -> Self {
        Self {
            router,
            invoker,
            config,
            mime,
            context,
        }
    }

    pub fn router(&self) -> &Router<HandlerDescriptor> {
        &self.router
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Application context shared by every request built through
    /// [`Dispatcher::dispatch_http`].
    pub fn context(&self) -> &Arc<AppContext> {
        &self.context
    }

    /// Dispatch a plain `http` request within this dispatcher's application
    /// context.
    pub fn dispatch_http(&self, request: http::Request<Vec<u8>>) -> ResponseDescriptor {
        self.dispatch(Request::from_http(request, Arc::clone(&self.context)))
    }

    /// Dispatch one request to completion.
    ///
    /// Never fails: routing misses become 404/405 and every
    /// [`DispatchError`] becomes a JSON error response with the status from
    /// [`DispatchError::status`]. Uploaded temp files are gone by the time
    /// this returns.
    pub fn dispatch(&self, mut request: Request) -> ResponseDescriptor {
        let request_id = RequestId::from_headers(request.headers());
        let method = request.method().clone();
        let path = request.path().to_string();
        let start = Instant::now();

        let resolved = match self.router.resolve(&method, &path) {
            Resolution::Found(resolved) => resolved,
            Resolution::NotFound => {
                info!(request_id = %request_id, method = %method, path = %path, "No route");
                return status_response(StatusCode::NOT_FOUND, "not found").with_request_id(request_id);
            }
            Resolution::MethodNotAllowed { allowed } => {
                let allow = allowed.iter().map(|m| m.as_str()).collect::<Vec<_>>().join(", ");
                let mut response = status_response(StatusCode::METHOD_NOT_ALLOWED, "method not allowed");
                if let Ok(value) = HeaderValue::from_str(&allow) {
                    response.headers.insert(ALLOW, value);
                }
                return response.with_request_id(request_id);
            }
        };
        let Some(handler) = resolved.handler else {
            return status_response(StatusCode::NOT_FOUND, "not found").with_request_id(request_id);
        };

        let cookies = parse_cookies(request.headers());
        let parts = match self.read_parts(&mut request) {
            Ok(parts) => parts,
            Err(err) => {
                warn!(
                    request_id = %request_id,
                    handler_name = %handler.name,
                    error = %err,
                    "Rejected malformed submission"
                );
                return error_response(&err, request_id);
            }
        };

        let inputs = RequestInputs {
            path_params: resolved.path_params,
            remainder: resolved.remainder,
            cookies,
            parts,
        };
        let mut exchange = Exchange::new(request);
        let result = self.handle_call(&handler, &mut exchange, &inputs, request_id);
        drop(inputs);

        let response = match result {
            Ok(response) => response.with_request_id(request_id),
            Err(err) => {
                error!(
                    request_id = %request_id,
                    handler_name = %handler.name,
                    status = err.status().as_u16(),
                    error = %err,
                    "Dispatch failed"
                );
                error_response(&err, request_id)
            }
        };
        info!(
            request_id = %request_id,
            method = %method,
            path = %path,
            handler_name = %handler.name,
            status = response.status.as_u16(),
            total_ms = start.elapsed().as_millis() as u64,
            "Request complete"
        );
        response
    }

    fn read_parts(&self, request: &mut Request) -> Result<Option<Parts>, DispatchError> {
        let Some(content_type) = request.content_type().filter(|ct| is_multipart(ct)) else {
            return Ok(None);
        };
        if !carries_body(request.method()) {
            return Ok(None);
        }
        let parser = MultipartParser::from_content_type(content_type, &self.config.default_charset)?
            .with_config(self.config.multipart());
        let body = request.take_body();
        let parts = parser.parse(body, &self.config.upload_dir)?;
        debug!(parts = parts.len(), boundary = parser.boundary(), "Multipart body parsed");
        Ok(Some(parts))
    }

    /// Run `handler` behind its filter chain and render the outcome.
    ///
    /// # Errors
    ///
    /// Any failure from the chain, or a reply that does not fit the
    /// handler's output kind.
    pub fn handle_call(
        &self,
        handler: &HandlerDescriptor,
        exchange: &mut Exchange,
        inputs: &RequestInputs,
        request_id: RequestId,
    ) -> Result<ResponseDescriptor, DispatchError> {
        debug!(
            request_id = %request_id,
            handler_name = %handler.name,
            filters = handler.chain.len(),
            "Request dispatched to handler"
        );
        let mut ctx = CallContext::new(exchange, inputs, request_id);
        let outcome = run_chain(&self.invoker, handler, &mut ctx)?;
        match outcome {
            ChainOutcome::Completed(reply) => render(
                &handler.name,
                handler.output,
                reply,
                ctx.response_mut(),
                &self.mime,
            ),
            ChainOutcome::ShortCircuited { .. } => Ok(from_exchange(ctx.response_mut())),
        }
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("routes", &self.router.len())
            .field("invoker", &self.invoker)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
