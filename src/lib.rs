pub mod analysis;
pub mod cli;
pub mod clients;
pub mod config;
pub mod pipeline;
pub mod source;
pub mod storage;
pub mod web;
