use crate::configuration::{DatabaseSettings, Settings};
use crate::payment_client::StripeClient;
use crate::routes::{check_health, preorder, stripe_webhook, subscribe};
use actix_web::dev::Server;
use actix_web::web::Data;
use actix_web::{web, App, HttpServer};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::net::TcpListener;
use tracing_actix_web::TracingLogger;

pub struct Application {
    server: Server,
    port: u16,
}

impl Application {
    pub async fn build(pg_pool: PgPool, settings: Settings) -> Result<Application, std::io::Error> {
        // Bind first: with port 0 the OS picks a free port and tests read it back
        let listener = TcpListener::bind(settings.application.get_url())?;
        let port = listener.local_addr()?.port();

        let stripe_client = StripeClient::new(settings.stripe);
        let server = run(listener, pg_pool, stripe_client)?;

        Ok(Self { server, port })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub async fn run_until_terminated(self) -> std::io::Result<()> {
        self.server.await
    }
}

pub fn get_pg_pool(settings: &DatabaseSettings) -> PgPool {
    // Lazy: the first query opens the connection, not process start
    PgPoolOptions::new()
        .acquire_timeout(std::time::Duration::from_secs(2))
        .connect_lazy_with(settings.get_pg_options())
}

pub fn run(
    listener: TcpListener,
    pg_pool: PgPool,
    stripe_client: StripeClient,
) -> Result<Server, std::io::Error> {
    // So to share data between threads, actix-web provide web::Data<T>(Arc<T>)
    // which is a thread-safe reference counting pointer to a value of type T
    let pg_pool = Data::new(pg_pool);
    let stripe_client = Data::new(stripe_client);

    let server = HttpServer::new(move || {
        App::new()
            .wrap(TracingLogger::default()) // logger middleware
            .route("/health", web::get().to(check_health))
            .route("/subscribe", web::post().to(subscribe))
            .route("/preorder", web::post().to(preorder))
            // No body-parsing middleware anywhere near this route: the
            // handler extracts the raw bytes Stripe signed
            .route("/stripe-webhook", web::post().to(stripe_webhook))
            // Application Context, that store state of application
            .app_data(pg_pool.clone())
            .app_data(stripe_client.clone())
    })
    .listen(listener)?
    .run();
    // server is already running at this point

    Ok(server)
}
