//! Concrete requests issued by simulated users and the classification of their responses.

use std::fmt;

use reqwest::{Method, StatusCode};
use serde_json::Value;

use crate::product::Product;

/// A single HTTP request prepared from a [`Task`](crate::scenario::Task).
#[derive(Clone, Debug)]
pub struct Request {
    /// Label under which the outcome is aggregated, e.g. `GET /products/:id`.
    pub name: &'static str,
    /// The HTTP method.
    pub method: Method,
    /// Path and query relative to the target host, e.g. `/products/7`.
    pub path: String,
    /// Optional JSON body.
    pub body: Option<Product>,
    /// Decides whether the response counts as a success.
    pub check: Check,
}

impl Request {
    /// Creates a `GET` request without a body.
    pub fn get(name: &'static str, path: impl Into<String>, check: Check) -> Self {
        Self {
            name,
            method: Method::GET,
            path: path.into(),
            body: None,
            check,
        }
    }

    /// Creates a `POST` request writing `product` to its details endpoint.
    ///
    /// The response is expected to be `204 No Content`.
    pub fn post_product(name: &'static str, product: Product) -> Self {
        Self {
            name,
            method: Method::POST,
            path: format!("/products/{}/details", product.product_id),
            body: Some(product),
            check: Check::Status(StatusCode::NO_CONTENT),
        }
    }
}

/// Validator that maps every response to exactly one [`Outcome`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Check {
    /// Succeeds only on exactly this status code.
    Status(StatusCode),
    /// Succeeds on `200 OK` with a JSON body whose `product_id` equals `id`.
    Product {
        /// The identifier that was requested.
        id: u64,
    },
}

fn same_id(value: &Value, id: u64) -> bool {
    value.as_u64() == Some(id) || value.as_f64() == Some(id as f64)
}

impl Check {
    /// Classifies a response given its status code and body.
    pub fn classify(&self, status: StatusCode, body: &[u8]) -> Outcome {
        match *self {
            Check::Status(expected) if status == expected => Outcome::Success,
            Check::Status(_) => Outcome::unexpected_status(status),
            Check::Product { .. } if status != StatusCode::OK => {
                Outcome::unexpected_status(status)
            }
            Check::Product { id } => match serde_json::from_slice::<Value>(body) {
                Ok(product) if product.get("product_id").is_some_and(|v| same_id(v, id)) => {
                    Outcome::Success
                }
                Ok(_) => Outcome::Failure("Product ID doesn't match".into()),
                Err(_) => Outcome::Failure("Invalid JSON response".into()),
            },
        }
    }
}

/// Classification of a completed request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// The response matched the expectation.
    Success,
    /// The request failed, with a human-readable reason.
    Failure(String),
}

impl Outcome {
    /// Creates a failure for a request that never produced a response.
    ///
    /// The reason combines the error with its innermost source, e.g.
    /// `error sending request: Connection refused (os error 111)`, so that failures with the
    /// same cause share a reason.
    pub fn from_error(error: &dyn std::error::Error) -> Self {
        let Some(mut root) = error.source() else {
            return Self::Failure(error.to_string());
        };
        while let Some(source) = root.source() {
            root = source;
        }

        Self::Failure(format!("{error}: {root}"))
    }

    fn unexpected_status(status: StatusCode) -> Self {
        Self::Failure(format!("Got status code {}", status.as_u16()))
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Success => f.write_str("success"),
            Outcome::Failure(reason) => write!(f, "failure: {reason}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn product_id_must_match() {
        let body = br#"{"product_id": 7, "sku": "SKU-0007"}"#;

        let check = Check::Product { id: 7 };
        assert_eq!(check.classify(StatusCode::OK, body), Outcome::Success);

        let check = Check::Product { id: 8 };
        assert_eq!(
            check.classify(StatusCode::OK, body),
            Outcome::Failure("Product ID doesn't match".into())
        );
    }

    #[test]
    fn product_status_checked_before_body() {
        let check = Check::Product { id: 7 };
        assert_eq!(
            check.classify(StatusCode::NOT_FOUND, b"not json"),
            Outcome::Failure("Got status code 404".into())
        );
    }

    #[test]
    fn float_product_id_matches() {
        let check = Check::Product { id: 7 };
        assert_eq!(
            check.classify(StatusCode::OK, br#"{"product_id": 7.0}"#),
            Outcome::Success
        );
        assert_eq!(
            check.classify(StatusCode::OK, br#"{"product_id": 7.5}"#),
            Outcome::Failure("Product ID doesn't match".into())
        );
    }

    #[test]
    fn product_body_must_be_json() {
        let check = Check::Product { id: 1 };
        assert_eq!(
            check.classify(StatusCode::OK, b"<html>"),
            Outcome::Failure("Invalid JSON response".into())
        );
        assert_eq!(
            check.classify(StatusCode::OK, b""),
            Outcome::Failure("Invalid JSON response".into())
        );
    }

    #[test]
    fn product_without_id_is_mismatch() {
        let check = Check::Product { id: 1 };
        let bodies: [&[u8]; 4] = [b"{}", b"[1]", br#"{"product_id": "1"}"#, b"null"];
        for body in bodies {
            assert_eq!(
                check.classify(StatusCode::OK, body),
                Outcome::Failure("Product ID doesn't match".into()),
                "{}",
                String::from_utf8_lossy(body)
            );
        }
    }

    #[test]
    fn exact_status() {
        let check = Check::Status(StatusCode::NO_CONTENT);
        assert_eq!(check.classify(StatusCode::NO_CONTENT, b""), Outcome::Success);
        assert_eq!(
            check.classify(StatusCode::INTERNAL_SERVER_ERROR, b""),
            Outcome::Failure("Got status code 500".into())
        );
        assert_eq!(
            check.classify(StatusCode::OK, b""),
            Outcome::Failure("Got status code 200".into())
        );
    }

    #[derive(Debug, thiserror::Error)]
    #[error("error sending request")]
    struct SendError(#[source] ConnectError);

    #[derive(Debug, thiserror::Error)]
    #[error("tcp connect error")]
    struct ConnectError(#[source] std::io::Error);

    #[test]
    fn error_reason_uses_root_cause() {
        let refused = || {
            SendError(ConnectError(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "connection refused",
            )))
        };

        let outcome = Outcome::from_error(&refused());
        assert_eq!(
            outcome,
            Outcome::Failure("error sending request: connection refused".into())
        );
        assert_eq!(outcome, Outcome::from_error(&refused()));
    }

    #[test]
    fn error_reason_without_source() {
        let error = std::io::Error::other("operation timed out");
        assert_eq!(
            Outcome::from_error(&error),
            Outcome::Failure("operation timed out".into())
        );
    }

    #[test]
    fn post_product_path() {
        let request = Request::post_product("post", Product::bulk(10_003));
        assert_eq!(request.method, Method::POST);
        assert_eq!(request.path, "/products/10003/details");
        assert_eq!(request.check, Check::Status(StatusCode::NO_CONTENT));
    }
}
