use std::task::{Context, Poll};

use http::header::USER_AGENT;
use http::{HeaderMap, HeaderValue, Request, Response};
use netkit::RequestError;
use tower::{Layer, Service};

/// Tower layer that fills in headers a request doesn't carry itself
///
/// Request headers always win; the defaults only cover missing names.
#[derive(Clone, Debug, Default)]
pub struct DefaultHeadersLayer {
    headers: HeaderMap,
}

impl DefaultHeadersLayer {
    #[must_use]
    pub fn new(headers: HeaderMap) -> Self {
        Self { headers }
    }

    /// Add a User-Agent default unless one is already among the defaults
    ///
    /// # Errors
    /// Returns `RequestError::InvalidHeader` if the user agent string is not a valid header value
    pub fn with_user_agent(mut self, user_agent: &str) -> Result<Self, RequestError> {
        let value = HeaderValue::from_str(user_agent).map_err(|e| RequestError::InvalidHeader {
            name: USER_AGENT.to_string(),
            reason: e.to_string(),
        })?;
        self.headers.entry(USER_AGENT).or_insert(value);
        Ok(self)
    }
}

impl<S> Layer<S> for DefaultHeadersLayer {
    type Service = DefaultHeadersService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        DefaultHeadersService {
            inner,
            headers: self.headers.clone(),
        }
    }
}

/// Service that adds default headers to requests
#[derive(Clone, Debug)]
pub struct DefaultHeadersService<S> {
    inner: S,
    headers: HeaderMap,
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for DefaultHeadersService<S>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>>,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = S::Future;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<ReqBody>) -> Self::Future {
        for name in self.headers.keys() {
            if req.headers().contains_key(name) {
                continue;
            }
            for value in self.headers.get_all(name) {
                req.headers_mut().append(name.clone(), value.clone());
            }
        }
        self.inner.call(req)
    }
}
