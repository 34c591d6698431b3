use anyhow::Result;

use super::config_model::{DotEnvyConfig, Server, Stripe};

pub fn load() -> Result<DotEnvyConfig> {
    dotenvy::dotenv().ok();

    let server = Server {
        port: std::env::var("SERVER_PORT")
            .unwrap_or_else(|_| "8080".to_string())
            .parse()?,
        body_limit: std::env::var("SERVER_BODY_LIMIT")
            .unwrap_or_else(|_| "1".to_string())
            .parse()?,
        timeout: std::env::var("SERVER_TIMEOUT")
            .unwrap_or_else(|_| "30".to_string())
            .parse()?,
    };

    let stripe = Stripe {
        secret_key: std::env::var("STRIPE_SECRET_KEY").expect("STRIPE_SECRET_KEY is invalid"),
        webhook_secret: std::env::var("STRIPE_WEBHOOK_SECRET")
            .expect("STRIPE_WEBHOOK_SECRET is invalid"),
    };

    Ok(DotEnvyConfig { server, stripe })
}
