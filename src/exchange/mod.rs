//! The request/response pair handled by one dispatch.
//!
//! The host container builds a [`Request`]; the dispatcher pairs it with a
//! fresh [`Response`] in an [`Exchange`]. Filter gates may swap either half
//! for the rest of the chain.

mod request;
mod response;
mod scope;

pub use request::{carries_body, parse_cookies, parse_query_params, Request, RequestBuilder};
pub use response::Response;
pub use scope::{AppContext, ScopeKind, Session, SharedScope};

#[derive(Debug)]
pub struct Exchange {
    pub request: Request,
    pub response: Response,
}

impl Exchange {
    pub fn new(request: Request) -> Self {
        Self {
            request,
            response: Response::new(),
        }
    }

    /// Substitute the request, returning the previous one.
    pub fn replace_request(&mut self, request: Request) -> Request {
        std::mem::replace(&mut self.request, request)
    }

    /// Substitute the response, returning the previous one.
    pub fn replace_response(&mut self, response: Response) -> Response {
        std::mem::replace(&mut self.response, response)
    }
}
