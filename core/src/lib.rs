pub mod auth;
pub mod db;
pub mod error;
pub mod models;
pub mod pipeline;
pub mod spoonacular;
pub mod store;
pub mod upstream;
