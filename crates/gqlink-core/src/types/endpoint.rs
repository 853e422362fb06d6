//! GraphQL endpoint type.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use url::Url;

use crate::error::{ConfigError, Error};

/// A validated GraphQL HTTP endpoint.
///
/// The endpoint must be an absolute `http://` or `https://` URL. Its
/// streaming counterpart is derived by swapping the scheme prefix for
/// `ws://` or `wss://`; the rest of the URL is kept verbatim.
///
/// # Example
///
/// ```
/// use gqlink_core::Endpoint;
///
/// let endpoint = Endpoint::new("https://api.example.com/graphql").unwrap();
/// assert_eq!(endpoint.stream_url(), "wss://api.example.com/graphql");
///
/// assert!(Endpoint::new("ftp://api.example.com/graphql").is_err());
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Endpoint {
    raw: String,
    url: Url,
}

impl Endpoint {
    /// Create a new endpoint from a string, validating the format.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Endpoint`] if the string is not an absolute URL
    /// with a host, and [`ConfigError::UnsupportedScheme`] if the scheme is
    /// neither `http` nor `https`.
    pub fn new(s: impl AsRef<str>) -> Result<Self, Error> {
        let raw = s.as_ref().trim();
        let url = Url::parse(raw).map_err(|e| ConfigError::Endpoint {
            value: raw.to_string(),
            reason: e.to_string(),
        })?;

        match url.scheme() {
            "http" | "https" => {}
            _ => {
                return Err(ConfigError::UnsupportedScheme {
                    value: raw.to_string(),
                }
                .into());
            }
        }

        if url.host_str().is_none() {
            return Err(ConfigError::Endpoint {
                value: raw.to_string(),
                reason: "must have a host".to_string(),
            }
            .into());
        }

        Ok(Self {
            raw: raw.to_string(),
            url,
        })
    }

    /// Returns the endpoint as given (trimmed).
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Returns the parsed URL.
    pub fn as_url(&self) -> &Url {
        &self.url
    }

    /// Returns the host string.
    pub fn host(&self) -> Option<&str> {
        self.url.host_str()
    }

    /// Returns true for `https://` endpoints.
    pub fn is_secure(&self) -> bool {
        self.url.scheme() == "https"
    }

    /// Returns the streaming URL: `http` becomes `ws`, `https` becomes `wss`.
    pub fn stream_url(&self) -> String {
        let stream_scheme = if self.is_secure() { "wss" } else { "ws" };
        let rest = &self.url.as_str()[self.url.scheme().len()..];
        format!("{}{}", stream_scheme, rest)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl FromStr for Endpoint {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl Serialize for Endpoint {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.raw)
    }
}

impl<'de> Deserialize<'de> for Endpoint {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Endpoint::new(&s).map_err(serde::de::Error::custom)
    }
}

impl AsRef<str> for Endpoint {
    fn as_ref(&self) -> &str {
        &self.raw
    }
}
