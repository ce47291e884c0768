//! Core components, types, and utilities for the review parser.
//!
//! This module contains fundamental building blocks used throughout the application:
//! - Configuration handling and environment variables.
//! - Extraction prompts and tool schemas for LLM interactions.
//! - Common types, request errors, and result handling.

pub mod config;
pub mod error;
pub mod prompts;
pub mod tools;
pub mod types;
