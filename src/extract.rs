// src/extract.rs

use axum::{
    Json,
    extract::{FromRequest, OptionalFromRequest, Request, rejection::JsonRejection},
    http::header,
};
use serde::de::DeserializeOwned;
use validator::Validate;

use crate::error::AppError;

/// JSON body extractor that maps every parse or validation failure to a 400 `AppError`.
///
/// Axum's own `Json` answers 415/422 with a plain-text body; handlers here always
/// reply with `{ "error": ... }`.
#[derive(Debug)]
pub struct ValidatedJson<T>(pub T);

impl<S, T> FromRequest<S> for ValidatedJson<T>
where
    T: DeserializeOwned + Validate,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = <Json<T> as FromRequest<S>>::from_request(req, state)
            .await
            .map_err(rejection_to_error)?;
        value.validate()?;
        Ok(ValidatedJson(value))
    }
}

/// A request without a `Content-Type` header yields `None`; anything else must be valid JSON.
impl<S, T> OptionalFromRequest<S> for ValidatedJson<T>
where
    T: DeserializeOwned + Validate,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Option<Self>, Self::Rejection> {
        if !req.headers().contains_key(header::CONTENT_TYPE) {
            return Ok(None);
        }
        <Self as FromRequest<S>>::from_request(req, state).await.map(Some)
    }
}

fn rejection_to_error(rejection: JsonRejection) -> AppError {
    tracing::debug!(error = %rejection.body_text(), "rejected JSON body");
    match rejection {
        JsonRejection::MissingJsonContentType(_) => {
            AppError::BadRequest("Expected a JSON body (Content-Type: application/json)".to_string())
        }
        other => AppError::BadRequest(other.body_text()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, Validate)]
    struct Payload {
        #[validate(length(min = 3))]
        name: String,
    }

    fn request(content_type: Option<&str>, body: &'static str) -> Request {
        let mut builder = axum::http::Request::builder().method("POST").uri("/");
        if let Some(ct) = content_type {
            builder = builder.header(header::CONTENT_TYPE, ct);
        }
        builder.body(Body::from(body)).unwrap()
    }

    #[tokio::test]
    async fn valid_body_passes() {
        let req = request(Some("application/json"), r#"{"name":"Owls"}"#);
        let ValidatedJson(p) = <ValidatedJson<Payload> as FromRequest<()>>::from_request(req, &()).await.unwrap();
        assert_eq!(p.name, "Owls");
    }

    #[tokio::test]
    async fn missing_field_is_bad_request() {
        let req = request(Some("application/json"), r#"{}"#);
        let err = <ValidatedJson<Payload> as FromRequest<()>>::from_request(req, &()).await.unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[tokio::test]
    async fn failed_validation_is_bad_request() {
        let req = request(Some("application/json"), r#"{"name":"x"}"#);
        let err = <ValidatedJson<Payload> as FromRequest<()>>::from_request(req, &()).await.unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[tokio::test]
    async fn missing_content_type_is_bad_request() {
        let req = request(None, r#"{"name":"Owls"}"#);
        let err = <ValidatedJson<Payload> as FromRequest<()>>::from_request(req, &()).await.unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[tokio::test]
    async fn optional_body_without_content_type_is_none() {
        let req = request(None, "");
        let out = <ValidatedJson<Payload> as OptionalFromRequest<()>>::from_request(req, &())
            .await
            .unwrap();
        assert!(out.is_none());
    }

    #[tokio::test]
    async fn optional_body_is_still_validated() {
        let req = request(Some("application/json"), r#"{"name":"x"}"#);
        let err = <ValidatedJson<Payload> as OptionalFromRequest<()>>::from_request(req, &())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));

        let req = request(Some("application/json"), r#"{"name":"Owls"}"#);
        let out = <ValidatedJson<Payload> as OptionalFromRequest<()>>::from_request(req, &())
            .await
            .unwrap();
        assert_eq!(out.map(|ValidatedJson(p)| p.name).as_deref(), Some("Owls"));
    }
}
