// src/lib.rs

//! newsroom: scrapes featured NBA news, reconciles it into a store and
//! serves it through a read API with live new-article events.

pub mod api;
pub mod app;
pub mod config;
pub mod error;
pub mod models;
pub mod notify;
pub mod pipeline;
pub mod services;
pub mod storage;
pub mod utils;
