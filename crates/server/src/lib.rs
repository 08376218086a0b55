pub mod config;
pub mod error;
pub mod http;
pub mod middleware;
pub mod routes;
pub mod state;
#[cfg(test)]
pub mod test_support;
