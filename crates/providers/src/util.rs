//! Shared helpers for the HTTP client.

use ht_domain::error::{Error, Result};

/// Convert a [`reqwest::Error`] into the domain [`Error`] type.
///
/// Timeout errors map to [`Error::Timeout`]; everything else maps to
/// [`Error::Http`].
pub(crate) fn from_reqwest(e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::Timeout(e.to_string())
    } else {
        Error::Http(e.to_string())
    }
}

/// Decode a JSON body into `T`, reporting schema mismatches as
/// [`Error::Decode`] tagged with the endpoint.
pub(crate) fn decode<T: serde::de::DeserializeOwned>(endpoint: &str, body: &str) -> Result<T> {
    serde_json::from_str(body).map_err(|e| Error::Decode {
        what: endpoint.to_string(),
        message: e.to_string(),
    })
}
