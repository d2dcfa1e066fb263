#![recursion_limit = "256"]

pub mod artifacts;
pub mod config;
pub mod data;
pub mod dataset;
pub mod error;
pub mod labels;
pub mod models;
pub mod optim;
pub mod plot;
pub mod stats;
pub mod training;
pub mod transforms;
