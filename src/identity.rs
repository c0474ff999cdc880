//! Identity keys for admission decisions.
//!
//! The registry treats identities as opaque strings; this module decides what
//! string a request is tracked under. [`PathKey`] uses the full request path,
//! so `/user/1/data` and `/user/2/data` get independent buckets. A closure
//! `Fn(&Req) -> String` works anywhere a [`KeyExtractor`] is expected, which is
//! the usual way to key on a caller principal instead.

/// Requests that expose a path.
pub trait RequestPath {
    fn path(&self) -> &str;
}

impl RequestPath for String {
    fn path(&self) -> &str {
        self
    }
}

impl RequestPath for &str {
    fn path(&self) -> &str {
        self
    }
}

/// Derives the identity a request is tracked under.
pub trait KeyExtractor<Req>: Send + Sync + 'static {
    fn extract(&self, req: &Req) -> String;
}

impl<Req, F> KeyExtractor<Req> for F
where
    F: Fn(&Req) -> String + Send + Sync + 'static,
{
    fn extract(&self, req: &Req) -> String {
        self(req)
    }
}

/// Keys every request by its full path.
#[derive(Debug, Clone, Copy, Default)]
pub struct PathKey;

impl<Req: RequestPath> KeyExtractor<Req> for PathKey {
    fn extract(&self, req: &Req) -> String {
        req.path().to_string()
    }
}

/// Keys requests by the `:param` segment of a route pattern, so
/// `/user/:id/data` maps `/user/7/data` to `user:7`. Paths that do not match
/// the pattern fall back to the full path.
#[derive(Debug, Clone)]
pub struct PatternKey {
    pattern: String,
}

impl PatternKey {
    pub fn new(pattern: impl Into<String>) -> Self {
        Self { pattern: pattern.into() }
    }
}

impl<Req: RequestPath> KeyExtractor<Req> for PatternKey {
    fn extract(&self, req: &Req) -> String {
        let path = req.path();
        match route_param(path, &self.pattern) {
            Ok(id) => format!("{}:{}", profiling_key(path), id),
            Err(_) => path.to_string(),
        }
    }
}

/// Errors from [`route_param`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RouteParamError {
    #[error("path does not match the expected pattern")]
    SegmentCount,
    #[error("no dynamic parameter found")]
    NoParameter,
}

/// Extract the value of the first `:param` segment of `pattern` from `path`.
///
/// Leading and trailing slashes are ignored and both must have the same
/// number of segments. Literal segments are not compared.
pub fn route_param<'a>(path: &'a str, pattern: &str) -> Result<&'a str, RouteParamError> {
    let path_segments: Vec<&str> = path.trim_matches('/').split('/').collect();
    let pattern_segments: Vec<&str> = pattern.trim_matches('/').split('/').collect();

    if path_segments.len() != pattern_segments.len() {
        return Err(RouteParamError::SegmentCount);
    }

    pattern_segments
        .iter()
        .position(|segment| segment.starts_with(':'))
        .map(|i| path_segments[i])
        .ok_or(RouteParamError::NoParameter)
}

/// Coarse metrics key for a path: its first segment (`/user/1/data` is
/// `user`). Empty for `/` and the empty path.
pub fn profiling_key(path: &str) -> &str {
    let rest = path.strip_prefix('/').unwrap_or(path);
    rest.split('/').next().unwrap_or("")
}
