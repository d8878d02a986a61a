//! Nutrition Label Scanner
//!
//! This library provides the core functionality for the nutriscan service:
//! a scan-to-structured-nutrition pipeline that stores a photographed label,
//! extracts its text through Replicate OCR, repairs numeric OCR artifacts,
//! and converts the result into a typed nutrition record via OpenAI.

pub mod app_state;
pub mod config;
pub mod db;
pub mod models;
pub mod routes;
pub mod services;
