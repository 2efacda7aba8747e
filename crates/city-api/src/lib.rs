pub mod auth;
pub mod company;
pub mod error;
pub mod mail;
pub mod middleware;
pub mod plots;
pub mod routes;
pub mod subscriptions;
