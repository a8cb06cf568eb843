//! Server-side rendering gateway for a headless storefront.
//!
//! A request is resolved to a page type through the backend's `route(url:)`
//! query, rendered, and sent with a hydration payload so the client can
//! resume without asking again. Rendered pages are cached per URL and
//! visitor state.

pub mod application;
pub mod cache;
pub mod config;
pub mod domain;
pub mod graphql;
pub mod hydration;
pub mod infra;
pub mod persistence;
pub mod presentation;
pub mod route;
