// src/jpx/mod.rs
pub mod client;
pub mod listing;
pub mod models;

pub use client::JpxClient;
pub use models::IssueRecord;
