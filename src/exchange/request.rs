use http::header::{HeaderName, HeaderValue, CONTENT_TYPE, COOKIE};
use http::{HeaderMap, Method};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::io::{self, Cursor, Read};
use std::sync::Arc;

use super::scope::{AppContext, Session};

/// Request body, readable exactly once.
enum Body {
    Empty,
    Stream(Box<dyn Read + Send>),
    Buffered(Vec<u8>),
    Taken,
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Body::Empty => f.write_str("Empty"),
            Body::Stream(_) => f.write_str("Stream(..)"),
            Body::Buffered(bytes) => write!(f, "Buffered({} bytes)", bytes.len()),
            Body::Taken => f.write_str("Taken"),
        }
    }
}

/// True for methods whose requests carry a body.
pub fn carries_body(method: &Method) -> bool {
    matches!(*method, Method::POST | Method::PUT | Method::PATCH)
}

/// Parse the `Cookie` header into a name/value map.
pub fn parse_cookies(headers: &HeaderMap) -> HashMap<String, String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|c| c.split(';'))
        .filter_map(|pair| {
            let mut parts = pair.trim().splitn(2, '=');
            let name = parts.next()?.trim();
            if name.is_empty() {
                return None;
            }
            let value = parts.next().unwrap_or("").trim().trim_matches('"');
            Some((name.to_string(), value.to_string()))
        })
        .collect()
}

/// Decode an `application/x-www-form-urlencoded` string, keeping order and
/// repeated names.
pub fn parse_query_params(query: &str) -> Vec<(String, String)> {
    url::form_urlencoded::parse(query.as_bytes())
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect()
}

/// An inbound request as handed over by the host.
#[derive(Debug)]
pub struct Request {
    method: Method,
    path: String,
    query: Option<String>,
    headers: HeaderMap,
    body: Body,
    params: Option<Vec<(String, String)>>,
    attributes: HashMap<String, Value>,
    session: Option<Arc<Session>>,
    context: Arc<AppContext>,
}

impl Request {
    /// Start building a request for `uri` (path plus optional `?query`).
    pub fn builder(method: Method, uri: &str) -> RequestBuilder {
        RequestBuilder::new(method, uri)
    }

    /// Adopt an `http::Request` with a buffered body.
    pub fn from_http(request: http::Request<Vec<u8>>, context: Arc<AppContext>) -> Self {
        let (parts, body) = request.into_parts();
        Self {
            method: parts.method,
            path: parts.uri.path().to_string(),
            query: parts.uri.query().map(str::to_string),
            headers: parts.headers,
            body: if body.is_empty() { Body::Empty } else { Body::Buffered(body) },
            params: None,
            attributes: HashMap::new(),
            session: None,
            context,
        }
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Path without the query string, still percent-encoded.
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn query(&self) -> Option<&str> {
        self.query.as_deref()
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn content_type(&self) -> Option<&str> {
        self.headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok())
    }

    pub fn session(&self) -> Option<&Arc<Session>> {
        self.session.as_ref()
    }

    pub fn set_session(&mut self, session: Arc<Session>) {
        self.session = Some(session);
    }

    pub fn context(&self) -> &Arc<AppContext> {
        &self.context
    }

    pub fn attribute(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name)
    }

    pub fn set_attribute(&mut self, name: impl Into<String>, value: Value) -> Option<Value> {
        self.attributes.insert(name.into(), value)
    }

    pub fn remove_attribute(&mut self, name: &str) -> Option<Value> {
        self.attributes.remove(name)
    }

    /// Read the whole body, buffering it so later calls see the same bytes.
    ///
    /// # Errors
    ///
    /// Read failures, or a body already handed out by [`Request::take_body`].
    pub fn body_bytes(&mut self) -> io::Result<&[u8]> {
        if let Body::Stream(reader) = &mut self.body {
            let mut bytes = Vec::new();
            reader.read_to_end(&mut bytes)?;
            self.body = Body::Buffered(bytes);
        }
        match &self.body {
            Body::Buffered(bytes) => Ok(bytes),
            Body::Taken => Err(io::Error::other("request body was already consumed")),
            Body::Empty | Body::Stream(_) => Ok(&[]),
        }
    }

    /// Hand the body stream out. Later reads of the body fail.
    pub fn take_body(&mut self) -> Box<dyn Read + Send> {
        match std::mem::replace(&mut self.body, Body::Taken) {
            Body::Stream(reader) => reader,
            Body::Buffered(bytes) => Box::new(Cursor::new(bytes)),
            Body::Empty | Body::Taken => Box::new(io::empty()),
        }
    }

    /// Request parameters: the query string, followed by the urlencoded form
    /// body for body-carrying methods. Parsed once and cached.
    ///
    /// # Errors
    ///
    /// Failure to read a form body.
    pub fn parameters(&mut self) -> io::Result<&[(String, String)]> {
        if self.params.is_none() {
            let mut params = self.query.as_deref().map(parse_query_params).unwrap_or_default();
            let is_form = self
                .content_type()
                .is_some_and(|ct| ct.trim_start().to_ascii_lowercase().starts_with("application/x-www-form-urlencoded"));
            if is_form && carries_body(&self.method) {
                let body = self.body_bytes()?;
                params.extend(
                    url::form_urlencoded::parse(body).map(|(k, v)| (k.into_owned(), v.into_owned())),
                );
            }
            self.params = Some(params);
        }
        Ok(self.params.as_deref().unwrap_or_default())
    }

    /// First value of a request parameter.
    ///
    /// # Errors
    ///
    /// See [`Request::parameters`].
    pub fn parameter(&mut self, name: &str) -> io::Result<Option<String>> {
        Ok(self
            .parameters()?
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.clone()))
    }
}

/// Builder returned by [`Request::builder`].
#[derive(Debug)]
pub struct RequestBuilder {
    request: Request,
    error: Option<http::Error>,
}

impl RequestBuilder {
    fn new(method: Method, uri: &str) -> Self {
        let (path, query) = match uri.split_once('?') {
            Some((path, query)) => (path, Some(query.to_string())),
            None => (uri, None),
        };
        Self {
            request: Request {
                method,
                path: path.to_string(),
                query,
                headers: HeaderMap::new(),
                body: Body::Empty,
                params: None,
                attributes: HashMap::new(),
                session: None,
                context: Arc::new(AppContext::default()),
            },
            error: None,
        }
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        if self.error.is_some() {
            return self;
        }
        match (HeaderName::from_bytes(name.as_bytes()), HeaderValue::from_str(value)) {
            (Ok(name), Ok(value)) => {
                self.request.headers.append(name, value);
            }
            (Err(e), _) => self.error = Some(e.into()),
            (_, Err(e)) => self.error = Some(e.into()),
        }
        self
    }

    pub fn body(mut self, bytes: impl Into<Vec<u8>>) -> Self {
        self.request.body = Body::Buffered(bytes.into());
        self
    }

    pub fn body_reader(mut self, reader: impl Read + Send + 'static) -> Self {
        self.request.body = Body::Stream(Box::new(reader));
        self
    }

    pub fn session(mut self, session: Arc<Session>) -> Self {
        self.request.session = Some(session);
        self
    }

    pub fn context(mut self, context: Arc<AppContext>) -> Self {
        self.request.context = context;
        self
    }

    pub fn attribute(mut self, name: impl Into<String>, value: Value) -> Self {
        self.request.attributes.insert(name.into(), value);
        self
    }

    /// # Errors
    ///
    /// The first invalid header name or value passed to [`RequestBuilder::header`].
    pub fn build(self) -> Result<Request, http::Error> {
        match self.error {
            Some(e) => Err(e),
            None => Ok(self.request),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_cookies() {
        let mut headers = HeaderMap::new();
        headers.append(COOKIE, HeaderValue::from_static("a=1; b = two ; flag"));
        headers.append(COOKIE, HeaderValue::from_static("c=\"quoted\""));
        let cookies = parse_cookies(&headers);
        assert_eq!(cookies.get("a").map(String::as_str), Some("1"));
        assert_eq!(cookies.get("b").map(String::as_str), Some("two"));
        assert_eq!(cookies.get("flag").map(String::as_str), Some(""));
        assert_eq!(cookies.get("c").map(String::as_str), Some("quoted"));
    }

    #[test]
    fn test_query_and_form_parameters_merge() {
        let mut request = Request::builder(Method::POST, "/submit?tag=a&tag=b")
            .header("content-type", "application/x-www-form-urlencoded")
            .body("name=J%C3%BCrgen+K&tag=c")
            .build()
            .unwrap();
        let params = request.parameters().unwrap().to_vec();
        assert_eq!(
            params,
            vec![
                ("tag".to_string(), "a".to_string()),
                ("tag".to_string(), "b".to_string()),
                ("name".to_string(), "Jürgen K".to_string()),
                ("tag".to_string(), "c".to_string()),
            ]
        );
        assert_eq!(request.parameter("name").unwrap().as_deref(), Some("Jürgen K"));
        // The body stays readable after parameter parsing.
        assert_eq!(request.body_bytes().unwrap(), b"name=J%C3%BCrgen+K&tag=c");
    }

    #[test]
    fn test_get_ignores_form_body() {
        let mut request = Request::builder(Method::GET, "/q?x=1")
            .header("content-type", "application/x-www-form-urlencoded")
            .body("y=2")
            .build()
            .unwrap();
        assert_eq!(request.parameters().unwrap().len(), 1);
    }

    #[test]
    fn test_body_is_read_once() {
        let mut request = Request::builder(Method::PUT, "/doc")
            .body_reader(Cursor::new(b"payload".to_vec()))
            .build()
            .unwrap();
        assert_eq!(request.body_bytes().unwrap(), b"payload");
        assert_eq!(request.body_bytes().unwrap(), b"payload");

        let mut stream = request.take_body();
        let mut out = String::new();
        stream.read_to_string(&mut out).unwrap();
        assert_eq!(out, "payload");
        assert!(request.body_bytes().is_err());
    }

    #[test]
    fn test_builder_rejects_bad_header() {
        assert!(Request::builder(Method::GET, "/")
            .header("bad header", "x")
            .build()
            .is_err());
    }

    #[test]
    fn test_from_http() {
        let http_request = http::Request::builder()
            .method(Method::DELETE)
            .uri("/items/9?force=true")
            .body(Vec::new())
            .unwrap();
        let request = Request::from_http(http_request, Arc::new(AppContext::new("app")));
        assert_eq!(request.path(), "/items/9");
        assert_eq!(request.query(), Some("force=true"));
        assert_eq!(request.context().name(), "app");
    }
}
