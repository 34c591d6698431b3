#[derive(Debug, Clone)]
pub struct DotEnvyConfig {
    pub server: Server,
    pub stripe: Stripe,
}

#[derive(Debug, Clone)]
pub struct Server {
    pub port: u16,
    /// Request body limit in megabytes.
    pub body_limit: u64,
    /// Request timeout in seconds.
    pub timeout: u64,
}

#[derive(Debug, Clone)]
pub struct Stripe {
    pub secret_key: String,
    pub webhook_secret: String,
}
