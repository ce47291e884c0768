//! Request handling for the review parser.
//!
//! This module coordinates the services (auth, database, storage, LLM) that
//! together answer a parse request.

pub mod parse_review;
