mod handlers;
mod models;
mod proxy;
mod state;

pub use handlers::{build_router, run_server};

/// The proxy still starts without a key; requests then fail with a 500.
pub fn resolve_server_key(override_key: Option<&str>) -> Option<String> {
    crate::providers::resolve_key(override_key).ok()
}
