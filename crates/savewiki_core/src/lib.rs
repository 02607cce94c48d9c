pub mod cache;
pub mod config;
pub mod constraint;
pub mod error;
pub mod extract;
pub mod manifest;
pub mod model;
pub mod path_args;
pub mod refresh;
pub mod resolve;
pub mod runtime;
pub mod template;
pub mod wiki;
