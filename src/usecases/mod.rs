pub mod billing_overview;
pub mod subscription_sync;
pub mod webhook_ingest;
