use crate::http::headers::HeaderMap;

/// Path prefix of ACME HTTP-01 challenge requests.
pub const ACME_CHALLENGE_PREFIX: &str = "/.well-known/acme-challenge";

/// HTTP request methods.
///
/// The listener does not treat any method specially; the method is carried
/// so a forwarded request reaches the backend unchanged. Methods without a
/// dedicated variant are kept verbatim in [`Method::Other`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Method {
    /// GET - Retrieve a resource
    GET,
    /// POST - Create or submit data
    POST,
    /// PUT - Replace a resource
    PUT,
    /// DELETE - Delete a resource
    DELETE,
    /// HEAD - Like GET but without the response body
    HEAD,
    /// OPTIONS - Describe communication options
    OPTIONS,
    /// PATCH - Partial modification of a resource
    PATCH,
    /// Any other method token (`PROPFIND`, `TRACE`, extension methods)
    Other(String),
}

/// Represents a parsed HTTP request from a client.
///
/// `target` is the request-target exactly as it appeared on the request
/// line: usually origin-form (`/path?query`), occasionally absolute-form
/// (`http://host/path`).
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    /// The HTTP method (GET, POST, etc.)
    pub method: Method,
    /// The request target as received
    pub target: String,
    /// HTTP version (typically "HTTP/1.1")
    pub version: String,
    /// Request headers in received order
    pub headers: HeaderMap,
    /// Request body, delimited by Content-Length
    pub body: Vec<u8>,
}

/// Builder for constructing Request objects.
#[derive(Default)]
pub struct RequestBuilder {
    method: Option<Method>,
    target: Option<String>,
    version: Option<String>,
    headers: HeaderMap,
    body: Vec<u8>,
}

impl Method {
    /// Parses an HTTP method from a string.
    ///
    /// Method names are case-sensitive. Any RFC 9110 token is accepted;
    /// `None` means the string is not a token at all.
    ///
    /// # Example
    ///
    /// ```
    /// # use tollgate::http::request::Method;
    /// assert_eq!(Method::from_str("GET"), Some(Method::GET));
    /// assert_eq!(Method::from_str("get"), Some(Method::Other("get".to_string())));
    /// assert_eq!(Method::from_str("NOT A METHOD"), None);
    /// ```
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        let method = match s {
            "GET" => Method::GET,
            "POST" => Method::POST,
            "PUT" => Method::PUT,
            "DELETE" => Method::DELETE,
            "HEAD" => Method::HEAD,
            "OPTIONS" => Method::OPTIONS,
            "PATCH" => Method::PATCH,
            _ if is_token(s) => Method::Other(s.to_string()),
            _ => return None,
        };
        Some(method)
    }

    pub fn as_str(&self) -> &str {
        match self {
            Method::GET => "GET",
            Method::POST => "POST",
            Method::PUT => "PUT",
            Method::DELETE => "DELETE",
            Method::HEAD => "HEAD",
            Method::OPTIONS => "OPTIONS",
            Method::PATCH => "PATCH",
            Method::Other(name) => name,
        }
    }
}

fn is_token(s: &str) -> bool {
    !s.is_empty()
        && s.bytes().all(|b| {
            b.is_ascii_alphanumeric() || b"!#$%&'*+-.^_`|~".contains(&b)
        })
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl RequestBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn method(mut self, method: Method) -> Self {
        self.method = Some(method);
        self
    }

    pub fn target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.append(key, value);
        self
    }

    pub fn body(mut self, body: Vec<u8>) -> Self {
        self.body = body;
        self
    }

    pub fn build(self) -> Result<Request, &'static str> {
        Ok(Request {
            method: self.method.ok_or("method missing")?,
            target: self.target.ok_or("target missing")?,
            version: self.version.unwrap_or_else(|| "HTTP/1.1".to_string()),
            headers: self.headers,
            body: self.body,
        })
    }
}

impl Request {
    /// Retrieves the first value of a header, case-insensitively.
    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers.get(key)
    }

    /// Splits an absolute-form target (`http://host/path`) into its scheme
    /// and the remainder after `://`.
    pub fn absolute_form(&self) -> Option<(&str, &str)> {
        if self.target.starts_with('/') {
            return None;
        }
        let (scheme, rest) = self.target.split_once("://")?;
        let valid = scheme.starts_with(|c: char| c.is_ascii_alphabetic())
            && scheme
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b"+-.".contains(&b));
        valid.then_some((scheme, rest))
    }

    /// The path component of the target, without query or fragment.
    ///
    /// For an absolute-form target the scheme and authority are skipped.
    pub fn path(&self) -> &str {
        let rest = match self.absolute_form() {
            Some((_, after)) => {
                let authority_end = after.find(['/', '?', '#']).unwrap_or(after.len());
                let rest = &after[authority_end..];
                if !rest.starts_with('/') {
                    return "/";
                }
                rest
            }
            None => self.target.as_str(),
        };
        let end = rest.find(['?', '#']).unwrap_or(rest.len());
        &rest[..end]
    }

    /// The `Host` header, trimmed, if present and non-empty.
    pub fn host(&self) -> Option<&str> {
        self.header("Host").map(str::trim).filter(|h| !h.is_empty())
    }

    /// True when the request targets the ACME HTTP-01 challenge space.
    ///
    /// The comparison is a case-sensitive prefix match with no
    /// normalization.
    pub fn is_acme_challenge(&self) -> bool {
        self.path().starts_with(ACME_CHALLENGE_PREFIX)
    }

    /// Reconstructs the full URL the client asked for.
    ///
    /// Absolute-form targets are used as-is; origin-form targets are joined
    /// with the `Host` header under the `http` scheme. Returns `None` when no
    /// host is known.
    pub fn url(&self) -> Option<url::Url> {
        if self.absolute_form().is_some() {
            return url::Url::parse(&self.target).ok();
        }
        url::Url::parse(&format!("http://{}{}", self.host()?, self.target)).ok()
    }

    /// Retrieves the Content-Length header value and parses it as a usize.
    ///
    /// Returns 0 if the header is missing or not a valid number.
    pub fn content_length(&self) -> usize {
        self.header("Content-Length")
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(0)
    }

    /// Determines whether the connection should remain open after the response.
    ///
    /// HTTP/1.1 defaults to keep-alive unless `Connection: close` is sent;
    /// HTTP/1.0 closes unless `Connection: keep-alive` is sent.
    pub fn keep_alive(&self) -> bool {
        if self.headers.has_token("Connection", "close") {
            return false;
        }
        if self.version == "HTTP/1.0" {
            return self.headers.has_token("Connection", "keep-alive");
        }
        true
    }
}
