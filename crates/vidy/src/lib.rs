//! HTTP front end of the YouTube comment analysis service

pub mod api;
pub mod config;
pub mod error;
