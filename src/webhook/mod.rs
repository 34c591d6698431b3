pub mod registry;

pub use registry::{
    HandlerBinding, HandlerFuture, WebhookHandlerRegistry, WebhookHandlerSource,
};
