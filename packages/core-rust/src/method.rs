//! HTTP method enumeration for service bindings.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The HTTP methods a service may bind to.
///
/// This is a closed set: the registry keys one binding table per variant,
/// and the dispatch pipeline rejects anything the transport hands it that
/// does not map onto one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Method {
    Get,
    Put,
    Post,
    Patch,
    Delete,
    Head,
}

impl Method {
    /// All bindable methods, in declaration order.
    pub const ALL: [Self; 6] = [
        Self::Get,
        Self::Put,
        Self::Post,
        Self::Patch,
        Self::Delete,
        Self::Head,
    ];

    /// Upper-case wire name of the method.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Put => "PUT",
            Self::Post => "POST",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
            Self::Head => "HEAD",
        }
    }

    /// Maps a transport-level method onto the bindable set.
    /// Returns `None` for methods no service can bind (OPTIONS, TRACE, ...).
    #[must_use]
    pub fn from_http(method: &http::Method) -> Option<Self> {
        match *method {
            http::Method::GET => Some(Self::Get),
            http::Method::PUT => Some(Self::Put),
            http::Method::POST => Some(Self::Post),
            http::Method::PATCH => Some(Self::Patch),
            http::Method::DELETE => Some(Self::Delete),
            http::Method::HEAD => Some(Self::Head),
            _ => None,
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
