use aether_presale::configuration::{DatabaseSettings, Settings};
use aether_presale::startup::Application;
use aether_presale::telemetry::{get_tracing_subscriber, init_tracing_subscriber};
use hmac::{Hmac, Mac};
use once_cell::sync::Lazy;
use secrecy::Secret;
use sha2::Sha256;
use sqlx::{Connection, Executor, PgConnection, PgPool};
use uuid::Uuid;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const TEST_WEBHOOK_SECRET: &str = "whsec_test_secret";

pub struct TestApp {
    pub addr: String,
    pub pg_pool: PgPool,
    pub stripe_server: MockServer,
    api_client: reqwest::Client,
}

impl TestApp {
    pub async fn post_subscribe(&self, body: String) -> reqwest::Response {
        self.api_client
            .post(&format!("{}/subscribe", self.addr))
            .header("Content-Type", "application/x-www-form-urlencoded")
            .body(body)
            .send()
            .await
            .expect("Failed to execute request")
    }

    pub async fn post_preorder(&self, body: String) -> reqwest::Response {
        self.api_client
            .post(&format!("{}/preorder", self.addr))
            .header("Content-Type", "application/x-www-form-urlencoded")
            .body(body)
            .send()
            .await
            .expect("Failed to execute request")
    }

    pub async fn post_preorder_json(&self, body: &serde_json::Value) -> reqwest::Response {
        self.api_client
            .post(&format!("{}/preorder", self.addr))
            .json(body)
            .send()
            .await
            .expect("Failed to execute request")
    }

    pub async fn post_webhook(&self, payload: String, signature: &str) -> reqwest::Response {
        self.api_client
            .post(&format!("{}/stripe-webhook", self.addr))
            .header("Content-Type", "application/json")
            .header("stripe-signature", signature)
            .body(payload)
            .send()
            .await
            .expect("Failed to execute request")
    }

    // Stub the Stripe checkout session endpoint for the lifetime of the test
    pub async fn stub_checkout_session(&self, session_id: &str, checkout_url: &str) {
        Mock::given(path("/v1/checkout/sessions"))
            .and(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": session_id,
                "url": checkout_url,
            })))
            .mount(&self.stripe_server)
            .await;
    }

    // Drive a pending pre-order into the database through the public API
    pub async fn create_pending_order(&self, email: &str, session_id: &str) {
        self.stub_checkout_session(session_id, "https://checkout.stripe.test/redirect")
            .await;
        let body = serde_urlencoded::to_string([("email", email), ("product_id", "aether-1")])
            .expect("Failed to encode pre-order body");
        let response = self.post_preorder(body).await;
        assert_eq!(303, response.status().as_u16());
    }
}

// Sign a payload the way Stripe populates the stripe-signature header
pub fn sign_webhook_payload(payload: &str, timestamp: i64) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(TEST_WEBHOOK_SECRET.as_bytes()).unwrap();
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload.as_bytes());
    format!(
        "t={},v1={}",
        timestamp,
        hex::encode(mac.finalize().into_bytes())
    )
}

pub fn checkout_completed_event(session_id: &str) -> String {
    serde_json::json!({
        "id": "evt_1",
        "type": "checkout.session.completed",
        "data": { "object": { "id": session_id } },
    })
    .to_string()
}

static TRACING: Lazy<()> = Lazy::new(|| {
    let test_name = "test_app";
    let default_log_level = "debug";
    if std::env::var("TEST_LOG").is_ok() {
        init_tracing_subscriber(get_tracing_subscriber(
            test_name,
            default_log_level,
            std::io::stdout,
        ));
    } else {
        init_tracing_subscriber(get_tracing_subscriber(
            test_name,
            default_log_level,
            std::io::sink,
        ));
    }
});

// The Stripe secrets are mandatory environment variables; give the test
// process deterministic ones before configuration is loaded
static STRIPE_TEST_ENV: Lazy<()> = Lazy::new(|| {
    if std::env::var("STRIPE_SECRET_KEY").is_err() {
        std::env::set_var("STRIPE_SECRET_KEY", "sk_test_key");
    }
    if std::env::var("STRIPE_WEBHOOK_SECRET").is_err() {
        std::env::set_var("STRIPE_WEBHOOK_SECRET", TEST_WEBHOOK_SECRET);
    }
});

pub async fn spawn_app() -> std::io::Result<TestApp> {
    // Lazy mean only run when it is called
    // once_cell make sure it is only run once on entire program lifetime
    Lazy::force(&TRACING);
    Lazy::force(&STRIPE_TEST_ENV);

    let stripe_server = MockServer::start().await;

    let settings = {
        let mut settings = Settings::get_configuration().expect("Failed to read configuration");

        // Use port 0 to ask the OS to pick a random free port
        settings.application.port = 0;
        // Point the Stripe client at the mock server, with a known secret
        // so tests can forge valid signatures
        settings.stripe.api_base_url = stripe_server.uri();
        settings.stripe.webhook_secret = Secret::new(TEST_WEBHOOK_SECRET.into());
        settings
    };

    let pg_pool = get_test_database(&settings.database).await;
    let app = Application::build(pg_pool.clone(), settings)
        .await
        .expect("Failed to build Server");

    let addr = format!("http://127.0.0.1:{}", app.port());

    // tokio::test manages background threads and terminates them when tests finish
    tokio::spawn(app.run_until_terminated());

    // Redirects must not be followed: several tests assert on the 303 itself
    let api_client = reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .expect("Failed to build test client");

    Ok(TestApp {
        addr,
        pg_pool,
        stripe_server,
        api_client,
    })
}

// Test will cause unexpected result if do same test multiple times to the same database
// So we need to create a brand new test database for each test for isolation
// Need to manually clean up test database
async fn get_test_database(database: &DatabaseSettings) -> PgPool {
    let database_name = Uuid::new_v4().to_string();

    let mut pg_options = database.get_base_pg_options();
    // Create test database
    let mut connection = PgConnection::connect_with(&pg_options)
        .await
        .expect("Failed to connect to Postgres");
    connection
        .execute(format!(r#"CREATE DATABASE "{}";"#, database_name).as_str())
        .await
        .expect("Failed to create database");

    pg_options = pg_options.database(&database_name);

    // Migrate database
    let connection_pool = PgPool::connect_with(pg_options)
        .await
        .expect("Failed to connect to Postgres");
    sqlx::migrate!("./migrations")
        .run(&connection_pool)
        .await
        .expect("Failed to migrate the database");

    connection_pool
}
