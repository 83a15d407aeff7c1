// MIT License
// HTTP transport abstraction

pub mod http;

#[cfg(test)]
pub(crate) mod fake;

use std::future::Future;

use crate::error::Result;

pub use http::HttpTransport;

/// Raw request/response exchange with the panel's web server.
///
/// Implementations own no session state: the token is supplied by the
/// caller on every request. A non-success HTTP status is an error; any
/// success status returns the body for the caller to interpret.
pub trait Transport: Send + Sync + 'static {
    /// `GET /<path>?guid=<token>`.
    fn get(&self, path: &str, token: &str) -> impl Future<Output = Result<String>> + Send;

    /// `POST /<path>` with a form-encoded body.
    fn post_form(
        &self,
        path: &str,
        form: &[(&str, &str)],
    ) -> impl Future<Output = Result<String>> + Send;

    /// `POST /<path>` with a pre-formatted body.
    fn post_body(&self, path: &str, body: String) -> impl Future<Output = Result<String>> + Send;
}
