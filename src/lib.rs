pub mod api;
pub mod config;
pub mod state;
pub mod test_support;
pub mod types;
pub mod util;
