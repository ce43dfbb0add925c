pub mod api;
pub mod app;
pub mod config;
pub mod error;
pub mod image;
pub mod migrate;
pub mod mongo_ext;
pub mod store;
pub mod util;
