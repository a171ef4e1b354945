//! Request extractors whose rejections use the `ApiResponse` envelope.
//!
//! axum's own `Json`, `Path` and axum-extra's `Query` answer malformed input
//! with a plain-text body; these wrappers route the same rejections through
//! [`ApiError`] so clients always get field errors.

use axum::extract::{FromRequest, FromRequestParts};

use crate::error::ApiError;

#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct Json<T>(pub T);

/// Repeated keys (`trades=a&trades=b`) collect into `Vec` fields.
#[derive(Debug, FromRequestParts)]
#[from_request(via(axum_extra::extract::Query), rejection(ApiError))]
pub struct Query<T>(pub T);

#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(ApiError))]
pub struct Path<T>(pub T);
