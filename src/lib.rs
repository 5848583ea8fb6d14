#![forbid(unsafe_code)]

//! Local tooling for a folder of generated video transcript summaries: a
//! small state API server and a static viewer builder.

pub mod config;
pub mod library;
pub mod state;
pub mod summary;
pub mod viewer;
