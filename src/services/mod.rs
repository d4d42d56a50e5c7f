pub mod content_rewriter;
pub mod cos_client;
pub mod lifecycle;
pub mod link_resolver;
pub mod media_service;
#[cfg(test)]
pub mod memory_store;
pub mod name_allocator;
pub mod remote_store;
pub mod settings;
pub mod signer;
