//! Service integrations for external APIs and clients.
//!
//! This module contains implementations for the services a parse request touches:
//! - Authentication (e.g., Supabase auth)
//! - Database services (e.g., PostgREST)
//! - Object storage (e.g., Supabase storage)
//! - LLM services (e.g., Anthropic, OpenAI)
//!
//! Each service module defines both generic traits and concrete implementations,
//! allowing for extensibility and easy testing.

pub mod auth;
pub mod db;
pub mod llm;
pub mod storage;
pub mod supabase;
