pub mod api;
pub mod bus;
pub mod config;
pub mod domain;
pub mod error;
pub mod fs_util;
pub mod model;
pub mod pipeline;
pub mod relations;
pub mod repository;
pub mod store;
pub mod tracker;
