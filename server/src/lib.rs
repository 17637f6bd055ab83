//! Stowage: chunked, resumable, deduplicated file ingestion into a
//! folder/file tree.

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod index;
pub mod service;
pub mod storage;
pub mod tree;
pub mod validation;
