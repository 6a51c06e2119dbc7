#![warn(clippy::all, missing_docs)]

//! Core library for the board-game catalog client.
//!
//! This crate hosts the catalog data model, configuration handling and the
//! async HTTP client used by the terminal UI and any future frontends.

pub mod client;
pub mod config;
pub mod models;

pub use client::{CatalogClient, CatalogError, CatalogResult, Operation};
pub use config::{CatalogConfig, StatusPolicy};
pub use models::{Boardgame, BoardgameSummary, Category, Mechanism, Tag};
