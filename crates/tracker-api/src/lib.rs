pub mod auth;
pub mod config;
pub mod credentials;
pub mod error;
pub mod events;
pub mod media;
pub mod middleware;
pub mod routes;
pub mod state;
pub mod storage;
pub mod subscriptions;
pub mod witness;

#[cfg(test)]
mod testing;
