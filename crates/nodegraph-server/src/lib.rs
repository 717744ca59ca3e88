//! HTTP front end for the node graph service

pub mod api;
pub mod config;
