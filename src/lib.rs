//! Stampa serves documents as HTML pages and as cached PDF renderings.

pub mod application;
pub mod cache;
pub mod config;
pub mod domain;
pub mod infra;
pub mod presentation;
