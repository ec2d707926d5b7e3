mod auth;
mod config;
mod error;
mod handlers;
mod models;
mod services;

use std::env;
use std::sync::Arc;

use actix_cors::Cors;
use actix_web::{middleware::Logger, web, App, HttpServer};
use dotenv::dotenv;

use auth::AuthService;
use services::database::DatabaseService;
use services::gemini::GeminiClient;
use services::razorpay::{PaymentGateway, PaymentSignature, RazorpayClient};
use services::subscription::SubscriptionOrchestrator;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv().ok();
    env_logger::init();

    let config = config::Config::from_env().expect("Failed to load configuration");

    let database_service = DatabaseService::new(&config.database_url)
        .await
        .expect("Failed to initialize database");

    let gateway: Arc<dyn PaymentGateway> = Arc::new(RazorpayClient::new(config.razorpay.clone()));
    let signature = PaymentSignature::new(config.razorpay.key_secret.clone());
    let orchestrator = web::Data::new(SubscriptionOrchestrator::new(
        database_service.clone(),
        gateway,
        signature,
    ));

    let gemini_client = GeminiClient::new(config.gemini.clone());
    let auth_service = AuthService::new(&config.jwt.secret, config.jwt.expiry_hours);

    let port = env::var("PORT").unwrap_or_else(|_| "8080".to_string());
    let bind_address = format!("0.0.0.0:{}", port);
    log::info!("starting LMS API server on {}", bind_address);

    let config = web::Data::new(config);

    HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .wrap(
                Cors::default()
                    .allow_any_origin()
                    .allow_any_method()
                    .allow_any_header()
                    .supports_credentials(),
            )
            .app_data(config.clone())
            .app_data(web::Data::new(database_service.clone()))
            .app_data(web::Data::new(gemini_client.clone()))
            .app_data(web::Data::new(auth_service.clone()))
            .app_data(orchestrator.clone())
            .service(
                web::scope("/api/v1")
                    .service(
                        web::scope("/users")
                            .service(handlers::users::signup)
                            .service(handlers::users::signin)
                            .service(handlers::users::me)
                            .service(handlers::users::update_profile)
                            .service(handlers::users::change_password),
                    )
                    .service(
                        web::scope("/courses")
                            .service(handlers::courses::list_courses)
                            .service(handlers::courses::create_course)
                            .service(handlers::courses::get_course)
                            .service(handlers::courses::update_course)
                            .service(handlers::courses::delete_course)
                            .service(handlers::courses::add_lecture),
                    )
                    .service(web::scope("/chat").service(handlers::chat::chat))
                    .service(
                        web::scope("/payment")
                            .service(handlers::payments::razorpay_key)
                            .service(handlers::payments::buy_subscription)
                            .service(handlers::payments::verify_subscription)
                            .service(handlers::payments::cancel_subscription)
                            .service(handlers::payments::list_payments),
                    )
                    .service(web::scope("/admin").service(handlers::admin::user_stats))
                    .route("/health", web::get().to(handlers::health::health_check)),
            )
    })
    .bind(&bind_address)?
    .run()
    .await
}
