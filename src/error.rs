//! Error type returned by the admission middleware
use crate::bucket::DenyReason;
use std::fmt;
use std::time::Duration;

/// Caller-visible message for a rejected request.
pub const AT_CAPACITY: &str = "the API is at capacity, try again later";

/// Error returned by [`AdmissionService`](crate::layer::AdmissionService).
#[derive(Debug, Clone, PartialEq)]
pub enum AdmissionError<E> {
    /// The identity's bucket had no token for this request
    Rejected {
        identity: String,
        retry_after: Option<Duration>,
        reason: DenyReason,
    },
    /// The wrapped service failed
    Inner(E),
}

impl<E: fmt::Display> fmt::Display for AdmissionError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rejected { .. } => f.write_str(AT_CAPACITY),
            Self::Inner(e) => write!(f, "{}", e),
        }
    }
}

impl<E: std::error::Error + 'static> std::error::Error for AdmissionError<E> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Inner(e) => Some(e),
            Self::Rejected { .. } => None,
        }
    }
}

impl<E> AdmissionError<E> {
    /// Check if the request was rejected for capacity
    pub fn is_rejected(&self) -> bool {
        matches!(self, Self::Rejected { .. })
    }
    /// Check if this error wraps an inner error.
    pub fn is_inner(&self) -> bool {
        matches!(self, Self::Inner(_))
    }
    /// Get the inner error if this is an Inner variant
    pub fn into_inner(self) -> Option<E> {
        match self {
            Self::Inner(e) => Some(e),
            Self::Rejected { .. } => None,
        }
    }
    /// Borrow the inner error if present.
    pub fn as_inner(&self) -> Option<&E> {
        match self {
            Self::Inner(e) => Some(e),
            Self::Rejected { .. } => None,
        }
    }
    /// Identity that was rejected.
    pub fn identity(&self) -> Option<&str> {
        match self {
            Self::Rejected { identity, .. } => Some(identity),
            Self::Inner(_) => None,
        }
    }
    /// When the rejected identity will next have a token, if ever.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::Rejected { retry_after, .. } => *retry_after,
            Self::Inner(_) => None,
        }
    }
    /// Why the bucket refused, for rejections.
    pub fn reason(&self) -> Option<DenyReason> {
        match self {
            Self::Rejected { reason, .. } => Some(*reason),
            Self::Inner(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[derive(Debug, Clone, PartialEq)]
    struct TestError(&'static str);
    impl fmt::Display for TestError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "{}", self.0)
        }
    }
    impl std::error::Error for TestError {}

    fn rejected() -> AdmissionError<TestError> {
        AdmissionError::Rejected {
            identity: "/user/1/data".into(),
            retry_after: Some(Duration::from_secs(12)),
            reason: DenyReason::Exhausted,
        }
    }

    #[test]
    fn rejected_uses_capacity_message() {
        let err = rejected();
        assert_eq!(err.to_string(), "the API is at capacity, try again later");
        assert!(err.is_rejected());
        assert!(!err.is_inner());
        assert_eq!(err.identity(), Some("/user/1/data"));
        assert_eq!(err.retry_after(), Some(Duration::from_secs(12)));
        assert_eq!(err.reason(), Some(DenyReason::Exhausted));
        assert!(err.source().is_none());
        assert_eq!(err.into_inner(), None);
    }

    #[test]
    fn inner_is_transparent() {
        let err = AdmissionError::Inner(TestError("boom"));
        assert_eq!(err.to_string(), "boom");
        assert!(err.source().is_some());
        assert_eq!(err.as_inner(), Some(&TestError("boom")));
        assert_eq!(err.retry_after(), None);
        assert_eq!(err.into_inner(), Some(TestError("boom")));
    }
}
