pub mod health_handlers;
pub mod hook_handlers;
pub mod lifecycle_handlers;
