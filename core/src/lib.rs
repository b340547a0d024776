pub mod aggregate;
pub mod archive;
pub mod cost;
pub mod db;
pub mod error;
pub mod library;
pub mod merge;
pub mod models;
pub mod plan;
pub mod service;
pub mod suggest;
pub mod sync;
