#![deny(missing_docs)]

//! Core library for the ragline ingestion and retrieval service.

/// HTTP routing and REST handlers.
pub mod api;
/// User accounts, password hashing, and bearer sessions.
pub mod auth;
/// Retrieval-augmented query answering and conversation records.
pub mod chat;
/// Environment-driven configuration management.
pub mod config;
/// Bounded work queue and the background worker pool.
pub mod dispatch;
/// Embedding client abstraction and adapters.
pub mod embedding;
/// Job lifecycle: records, the store contract, and the orchestrator.
pub mod jobs;
/// Structured logging and tracing setup.
pub mod logging;
/// Object storage client for staged document uploads.
pub mod object_store;
/// Document parsing and chunking utilities.
pub mod processing;
/// Vector index contract and Qdrant integration.
pub mod vector;
