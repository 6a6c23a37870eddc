use axum::{
    extract::{FromRef, FromRequestParts},
    http::{header::AUTHORIZATION, request::Parts, HeaderMap},
};

use crate::{AdminKey, AppError};

/// Proof that the request carried the admin bearer token.
#[derive(Debug)]
pub struct Admin;

pub fn authorize(headers: &HeaderMap, key: &AdminKey) -> Result<Admin, AppError> {
    let token = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    match token {
        Some(token) if !token.is_empty() && constant_time_eq(token.as_bytes(), key.0.as_bytes()) => Ok(Admin),
        _ => Err(AppError::Unauthorized),
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }

    diff == 0
}

impl<S> FromRequestParts<S> for Admin
where
    AdminKey: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        authorize(&parts.headers, &AdminKey::from_ref(state))
    }
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    fn headers(auth: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static(auth));
        headers
    }

    #[test]
    fn only_exact_bearer_token_passes() {
        let key = AdminKey("s3cret".to_owned());

        assert!(authorize(&headers("Bearer s3cret"), &key).is_ok());
        assert!(matches!(authorize(&headers("Bearer wrong"), &key), Err(AppError::Unauthorized)));
        assert!(matches!(authorize(&headers("s3cret"), &key), Err(AppError::Unauthorized)));
        assert!(matches!(authorize(&headers("Basic s3cret"), &key), Err(AppError::Unauthorized)));
        assert!(matches!(authorize(&HeaderMap::new(), &key), Err(AppError::Unauthorized)));
    }

    #[test]
    fn token_comparison_checks_every_byte() {
        assert!(constant_time_eq(b"s3cret", b"s3cret"));
        assert!(!constant_time_eq(b"s3cret", b"s3creT"));
        assert!(!constant_time_eq(b"s3cret", b"x3cret"));
        assert!(!constant_time_eq(b"s3cret", b"s3cre"));
        assert!(constant_time_eq(b"", b""));
    }

    #[test]
    fn empty_key_never_matches() {
        let key = AdminKey(String::new());
        assert!(authorize(&headers("Bearer "), &key).is_err());
    }
}
