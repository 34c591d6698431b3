pub mod stripe_webhook;
