use crate::payment_client::{StripeClient, WebhookVerificationError, CHECKOUT_SESSION_COMPLETED};
use crate::routes::OrderStatus;
use crate::utils::error_chain_fmt;
use actix_web::{web, HttpRequest, HttpResponse, ResponseError};
use anyhow::Context;
use sqlx::PgPool;
use std::fmt::{Debug, Formatter};

#[derive(thiserror::Error)]
pub enum WebhookError {
    // Unauthenticated deliveries are discarded before touching the database
    #[error("Webhook Error: {0}")]
    Verification(#[from] WebhookVerificationError),
    #[error("Webhook Error: completed checkout event carries no session id")]
    MissingSessionId,
    #[error("Something went wrong.")]
    UnexpectedError(#[from] anyhow::Error),
}

impl ResponseError for WebhookError {
    fn status_code(&self) -> actix_web::http::StatusCode {
        match self {
            WebhookError::Verification(_) | WebhookError::MissingSessionId => {
                actix_web::http::StatusCode::BAD_REQUEST
            }
            WebhookError::UnexpectedError(_) => actix_web::http::StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl Debug for WebhookError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}

#[tracing::instrument(
    name = "Reconcile a Stripe webhook event",
    skip(payload, request, pg_pool, stripe_client),
    fields(event_type = tracing::field::Empty, session_id = tracing::field::Empty)
)]
pub async fn stripe_webhook(
    // Raw bytes, not a parsed body: the signature covers the exact byte
    // sequence Stripe sent
    payload: web::Bytes,
    request: HttpRequest,
    pg_pool: web::Data<PgPool>,
    stripe_client: web::Data<StripeClient>,
) -> Result<HttpResponse, WebhookError> {
    let signature = request
        .headers()
        .get("stripe-signature")
        .and_then(|value| value.to_str().ok())
        .ok_or(WebhookVerificationError::MissingHeader)?;

    let event = stripe_client.verify_webhook_event(&payload, signature)?;
    tracing::Span::current().record("event_type", tracing::field::display(&event.event_type));

    if event.event_type == CHECKOUT_SESSION_COMPLETED {
        let session_id = event.object_id().ok_or(WebhookError::MissingSessionId)?;
        tracing::Span::current().record("session_id", tracing::field::display(session_id));
        mark_order_paid(&pg_pool, session_id)
            .await
            .context("Failed to update pre-order status")?;
    } else {
        // Every other verified event type is acknowledged with no side effect
        tracing::info!("Ignoring unhandled event type");
    }

    // Stripe marks the event delivered on any 2xx acknowledgment
    Ok(HttpResponse::Ok().json(serde_json::json!({ "received": true })))
}

#[tracing::instrument(name = "Mark a pre-order as paid", skip(pg_pool))]
async fn mark_order_paid(pg_pool: &PgPool, session_id: &str) -> sqlx::Result<()> {
    let result = sqlx::query(
        r#"
        UPDATE presale_orders
        SET status = $1
        WHERE stripe_session_id = $2
        "#,
    )
    .bind(OrderStatus::Paid.as_ref())
    .bind(session_id)
    .execute(pg_pool)
    .await?;

    // Zero matched rows is not an error: the event may be a redelivery for an
    // already-paid order, or it raced the pre-order insert and Stripe will
    // redeliver it
    if result.rows_affected() == 0 {
        tracing::info!("No pre-order matches the checkout session");
    }

    Ok(())
}
