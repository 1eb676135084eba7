use super::HeaderValue;

use std::fmt;

/// A parsed `Authorization` header: `<scheme> <credentials>`.
#[derive(Clone, PartialEq, Eq)]
pub struct Authorization {
    scheme: String,
    credentials: String,
}

impl Authorization {
    /// Parse an `Authorization` header value.
    ///
    /// Returns `None` if the value is not valid text or has no scheme.
    pub fn parse(value: &HeaderValue) -> Option<Authorization> {
        let value = value.to_str().ok()?.trim();

        let (scheme, credentials) = match value.split_once(' ') {
            Some((scheme, credentials)) => (scheme, credentials.trim()),
            None => (value, ""),
        };

        if scheme.is_empty() {
            return None;
        }

        Some(Authorization {
            scheme: scheme.to_owned(),
            credentials: credentials.to_owned(),
        })
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    pub fn credentials(&self) -> &str {
        &self.credentials
    }

    /// Returns `true` if the scheme matches, ignoring case.
    pub fn is(&self, scheme: &str) -> bool {
        self.scheme.eq_ignore_ascii_case(scheme)
    }

    /// Returns the token of a `Bearer` authorization.
    pub fn bearer(&self) -> Option<&str> {
        self.is("bearer").then(|| self.credentials())
    }
}

// credentials are secret
impl fmt::Debug for Authorization {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Authorization")
            .field("scheme", &self.scheme)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bearer() {
        let auth = Authorization::parse(&HeaderValue::from_static("Bearer  abc.def")).unwrap();
        assert_eq!(auth.scheme(), "Bearer");
        assert_eq!(auth.bearer(), Some("abc.def"));
        assert!(!format!("{:?}", auth).contains("abc"));
    }

    #[test]
    fn scheme_only() {
        let auth = Authorization::parse(&HeaderValue::from_static("Negotiate")).unwrap();
        assert_eq!(auth.credentials(), "");
        assert_eq!(auth.bearer(), None);
        assert!(Authorization::parse(&HeaderValue::from_static("")).is_none());
    }
}
