//! atlas-gateway - An authenticated gateway for geospatial tile datasets
//!
//! This crate serves bounding-box tile queries and tile downloads for LiDAR
//! and GeoPackage datasets behind bearer-token authentication and rate
//! limiting, and takes in access requests for new users.

pub mod access;
pub mod atlas;
pub mod auth;
pub mod config;
pub mod error;
pub mod github;
pub mod models;
pub mod otel;
pub mod server;
