//! Core configuration

pub mod config;
