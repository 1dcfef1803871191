pub mod analysis;
pub mod calculator;
pub mod models;
pub mod service;
pub mod store;
