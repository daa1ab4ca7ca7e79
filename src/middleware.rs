//! Identity is established by the upstream gateway, which forwards the caller's id
//! and role as headers. These layers turn them into an [`Actor`] extension.

use axum::{
    extract::Request,
    http::HeaderMap,
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::{
    app_error::AppError,
    domain::roles::{Actor, Role},
};

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_ROLE_HEADER: &str = "x-user-role";

pub fn actor_from_headers(headers: &HeaderMap) -> Result<Actor, AppError> {
    let id = headers
        .get(USER_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<i32>().ok())
        .ok_or(AppError::Unauthorized)?;
    let role = headers
        .get(USER_ROLE_HEADER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse::<Role>().ok())
        .ok_or(AppError::Unauthorized)?;

    Ok(Actor::new(id, role))
}

async fn authorize(
    mut req: Request,
    next: Next,
    allowed: fn(Role) -> bool,
    denied: &str,
) -> Response {
    let actor = match actor_from_headers(req.headers()) {
        Ok(actor) => actor,
        Err(err) => return err.into_response(),
    };

    if !allowed(actor.role) {
        return AppError::ForbiddenResource(denied.into()).into_response();
    }

    req.extensions_mut().insert(actor);
    next.run(req).await
}

/// Any authenticated caller.
pub async fn authenticate(req: Request, next: Next) -> Response {
    authorize(req, next, |_| true, "").await
}

pub async fn patients_authorization(req: Request, next: Next) -> Response {
    authorize(
        req,
        next,
        |role| matches!(role, Role::Patient),
        "Only patients can access this resource",
    )
    .await
}

/// Pharmacists and admins.
pub async fn staff_authorization(req: Request, next: Next) -> Response {
    authorize(
        req,
        next,
        |role| role.is_staff(),
        "Only pharmacists and administrators can access this resource",
    )
    .await
}

pub async fn admin_authorization(req: Request, next: Next) -> Response {
    authorize(
        req,
        next,
        |role| matches!(role, Role::Admin),
        "Only administrators can access this resource",
    )
    .await
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    fn headers(id: &str, role: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(USER_ID_HEADER, HeaderValue::from_str(id).unwrap());
        headers.insert(USER_ROLE_HEADER, HeaderValue::from_str(role).unwrap());
        headers
    }

    #[test]
    fn parses_gateway_headers() {
        let actor = actor_from_headers(&headers("42", "pharmacist")).unwrap();
        assert_eq!(actor, Actor::new(42, Role::Pharmacist));
    }

    #[test]
    fn rejects_missing_or_malformed_identity() {
        assert!(matches!(
            actor_from_headers(&HeaderMap::new()),
            Err(AppError::Unauthorized)
        ));
        assert!(matches!(
            actor_from_headers(&headers("abc", "patient")),
            Err(AppError::Unauthorized)
        ));
        assert!(matches!(
            actor_from_headers(&headers("1", "superuser")),
            Err(AppError::Unauthorized)
        ));
    }
}
