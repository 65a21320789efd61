//! ragdesk: terminal client for a document-grounded RAG chat backend
//!
//! Chat with the backend's assistant, browse the document sources it indexes,
//! choose which remote files go into the index, and (for administrators)
//! connect new storage providers.

pub mod admin;
pub mod api;
pub mod chat;
pub mod commands;
pub mod config;
pub mod error;
pub mod events;
pub mod explorer;
pub mod jwt;
pub mod models;
pub mod navigation;
pub mod oauth;
pub mod progress;
pub mod token;
