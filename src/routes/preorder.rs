use crate::payment_client::{CheckoutLineItem, StripeClient};
use crate::routes::OrderStatus;
use crate::utils::{error_chain_fmt, see_other};
use actix_web::{web, Either, HttpResponse, ResponseError};
use anyhow::Context;
use chrono::Utc;
use serde::Deserialize;
use sqlx::PgPool;
use std::fmt::{Debug, Formatter};
use uuid::Uuid;

const BASE_PRODUCT_NAME: &str = "Aether Hardcover";
const BASE_PRODUCT_UNIT_AMOUNT: i64 = 2499;
const DEDICATION_NAME: &str = "Personalized Dedication";
const DEDICATION_UNIT_AMOUNT: i64 = 500;
const CURRENCY: &str = "usd";

#[derive(Deserialize)]
pub struct PreorderForm {
    email: Option<String>,
    product_id: Option<String>,
    dedication: Option<Dedication>,
}

// Clients send either a boolean flag or the dedication text itself
#[derive(Deserialize)]
#[serde(untagged)]
pub enum Dedication {
    Flag(bool),
    Text(String),
}

impl Dedication {
    fn is_requested(&self) -> bool {
        match self {
            Dedication::Flag(flag) => *flag,
            Dedication::Text(text) => !text.is_empty(),
        }
    }
}

#[derive(thiserror::Error)]
pub enum PreorderError {
    #[error("{0}")]
    ValidationError(String),
    // Full detail stays in the logs; callers only see a generic message
    #[error("Something went wrong.")]
    UnexpectedError(#[from] anyhow::Error),
}

impl ResponseError for PreorderError {
    fn status_code(&self) -> actix_web::http::StatusCode {
        match self {
            PreorderError::ValidationError(_) => actix_web::http::StatusCode::BAD_REQUEST,
            PreorderError::UnexpectedError(_) => {
                actix_web::http::StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl Debug for PreorderError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}

#[tracing::instrument(
    name = "Create a pre-order checkout session",
    skip(form, pg_pool, stripe_client),
    fields(email = tracing::field::Empty, session_id = tracing::field::Empty)
)]
pub async fn preorder(
    form: Either<web::Form<PreorderForm>, web::Json<PreorderForm>>,
    pg_pool: web::Data<PgPool>,
    stripe_client: web::Data<StripeClient>,
) -> Result<HttpResponse, PreorderError> {
    let form = form.into_inner();
    let email = form.email.as_deref().filter(|email| !email.is_empty());
    let product_id = form.product_id.as_deref().filter(|id| !id.is_empty());
    // product_id is only checked for presence; the line items below are fixed
    let (email, _product_id) = match (email, product_id) {
        (Some(email), Some(product_id)) => (email, product_id),
        _ => {
            return Err(PreorderError::ValidationError(
                "Email and product ID are required".into(),
            ))
        }
    };
    tracing::Span::current().record("email", tracing::field::display(email));

    let with_dedication = form
        .dedication
        .as_ref()
        .map_or(false, Dedication::is_requested);
    let line_items = build_line_items(with_dedication);

    let session = stripe_client
        .create_checkout_session(email, &line_items)
        .await
        .context("Failed to create a checkout session with Stripe")?;
    tracing::Span::current().record("session_id", tracing::field::display(&session.id));

    // The order row must exist before the caller is redirected, so that a
    // webhook racing the checkout still finds a row to update
    // If this insert fails the provider session is orphaned and the error
    // is surfaced; nothing retries it
    insert_pending_order(&pg_pool, email, &session.id)
        .await
        .context("Failed to insert pre-order")?;

    Ok(see_other(&session.url))
}

fn build_line_items(with_dedication: bool) -> Vec<CheckoutLineItem> {
    let mut line_items = vec![CheckoutLineItem {
        name: BASE_PRODUCT_NAME.into(),
        currency: CURRENCY.into(),
        unit_amount: BASE_PRODUCT_UNIT_AMOUNT,
        quantity: 1,
    }];
    if with_dedication {
        line_items.push(CheckoutLineItem {
            name: DEDICATION_NAME.into(),
            currency: CURRENCY.into(),
            unit_amount: DEDICATION_UNIT_AMOUNT,
            quantity: 1,
        });
    }
    line_items
}

#[tracing::instrument(name = "Insert a pending pre-order into the database", skip(pg_pool))]
async fn insert_pending_order(
    pg_pool: &PgPool,
    email: &str,
    session_id: &str,
) -> sqlx::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO presale_orders (id, email, stripe_session_id, status, created_at)
        VALUES ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(email)
    .bind(session_id)
    .bind(OrderStatus::Pending.as_ref())
    .bind(Utc::now())
    .execute(pg_pool)
    .await?;

    Ok(())
}
