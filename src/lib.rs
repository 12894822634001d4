// src/lib.rs

//! kittyalert: detect newly listed shelter animals and notify subscribers.

pub mod config;
pub mod error;
pub mod models;
pub mod pipeline;
pub mod services;
pub mod storage;
pub mod utils;
