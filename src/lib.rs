// Library exports for Meowmery
// Integration tests drive the services and the router through these modules

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod extractors;
pub mod geocode;
pub mod response;
pub mod routes;
pub mod services;
pub mod state;
pub mod storage;
