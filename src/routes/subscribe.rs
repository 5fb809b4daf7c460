use crate::utils::error_chain_fmt;
use actix_web::{web, Either, HttpResponse, ResponseError};
use anyhow::Context;
use chrono::Utc;
use serde::Deserialize;
use sqlx::PgPool;
use std::fmt::{Debug, Formatter};
use uuid::Uuid;

#[derive(Deserialize)]
pub struct SubscribeForm {
    email: Option<String>,
}

#[derive(thiserror::Error)]
pub enum SubscribeError {
    #[error("{0}")]
    ValidationError(String),
    // Full detail stays in the logs; callers only see a generic message
    #[error("Something went wrong.")]
    UnexpectedError(#[from] anyhow::Error),
}

impl ResponseError for SubscribeError {
    fn status_code(&self) -> actix_web::http::StatusCode {
        match self {
            SubscribeError::ValidationError(_) => actix_web::http::StatusCode::BAD_REQUEST,
            SubscribeError::UnexpectedError(_) => {
                actix_web::http::StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl Debug for SubscribeError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}

#[tracing::instrument(
    name = "Add a new subscriber",
    skip(form, pg_pool),
    fields(email = tracing::field::Empty)
)]
pub async fn subscribe(
    form: Either<web::Form<SubscribeForm>, web::Json<SubscribeForm>>,
    pg_pool: web::Data<PgPool>,
) -> Result<HttpResponse, SubscribeError> {
    let form = form.into_inner();
    let email = form
        .email
        .as_deref()
        .filter(|email| !email.is_empty())
        .ok_or_else(|| SubscribeError::ValidationError("Email is required".into()))?;
    tracing::Span::current().record("email", tracing::field::display(email));

    insert_subscriber(&pg_pool, email)
        .await
        .context("Failed to insert new subscriber")?;

    Ok(HttpResponse::Ok().body("Thank you for subscribing!"))
}

// Separate sql query into separate function (separation of concerns)
// This function not dependent on actix-web framework
#[tracing::instrument(name = "Insert a new subscriber into the database", skip(pg_pool))]
async fn insert_subscriber(pg_pool: &PgPool, email: &str) -> sqlx::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO subscribers (id, email, subscribed_at)
        VALUES ($1, $2, $3)
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(email)
    .bind(Utc::now())
    .execute(pg_pool)
    .await?;

    Ok(())
}
