//! Contains a remote implementation using HTTP to talk to the service under test.

use std::time::Duration;

use bytes::Bytes;
use reqwest::StatusCode;
use thiserror::Error;
use url::Url;

use crate::request::{Outcome, Request};

const USER_AGENT: &str = concat!("loadtest/", env!("CARGO_PKG_VERSION"));

/// Errors that prevent a request from producing a response.
#[derive(Debug, Error)]
pub enum Error {
    /// The host or request path do not form a valid URL.
    #[error("invalid url")]
    Url(#[from] url::ParseError),
    /// The host URL uses a scheme other than `http` or `https`.
    #[error("unsupported scheme `{0}`, expected http or https")]
    UnsupportedScheme(String),
    /// Connection, timeout or body errors from the underlying [`reqwest`] client.
    #[error(transparent)]
    Reqwest(#[from] reqwest::Error),
}

/// A response that has been fully read.
#[derive(Debug)]
pub struct Response {
    /// The HTTP status code.
    pub status: StatusCode,
    /// The full response body.
    pub body: Bytes,
}

/// A remote implementation using HTTP to interact with the service under test.
///
/// Cloning is cheap and shares the connection pool.
#[derive(Clone, Debug)]
pub struct HttpRemote {
    host: Url,
    client: reqwest::Client,
}

impl HttpRemote {
    /// Creates a new `HttpRemote` for the given host, e.g. `http://localhost:8080`.
    ///
    /// `timeout` bounds every request from connecting until the body has been read.
    pub fn new(host: &str, timeout: Duration) -> Result<Self, Error> {
        let host = Url::parse(host)?;
        if !matches!(host.scheme(), "http" | "https") {
            return Err(Error::UnsupportedScheme(host.scheme().to_owned()));
        }

        Self::with_url(host, timeout)
    }

    /// Creates a remote without checking the scheme, so every request fails in the client.
    #[cfg(test)]
    pub(crate) fn unchecked(host: &str, timeout: Duration) -> Result<Self, Error> {
        Self::with_url(Url::parse(host)?, timeout)
    }

    fn with_url(host: Url, timeout: Duration) -> Result<Self, Error> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self { host, client })
    }

    /// The base URL of the service under test.
    pub fn host(&self) -> &Url {
        &self.host
    }

    /// Sends the request and reads the full response.
    pub async fn send(&self, request: &Request) -> Result<Response, Error> {
        let url = self.host.join(&request.path)?;

        let mut builder = self.client.request(request.method.clone(), url);
        if let Some(ref body) = request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await?;
        let status = response.status();
        let body = response.bytes().await?;

        Ok(Response { status, body })
    }

    /// Sends the request and classifies the result.
    ///
    /// Transport errors become failures, so this never aborts the caller's loop.
    pub async fn execute(&self, request: &Request) -> Outcome {
        match self.send(request).await {
            Ok(response) => request.check.classify(response.status, &response.body),
            Err(err) => {
                // The URL differs per request and would split identical causes apart.
                let err = match err {
                    Error::Reqwest(err) => Error::Reqwest(err.without_url()),
                    err => err,
                };
                tracing::trace!(
                    error = &err as &dyn std::error::Error,
                    path = %request.path,
                    "request failed"
                );
                Outcome::from_error(&err)
            }
        }
    }
}
