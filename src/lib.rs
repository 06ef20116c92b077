pub mod cli;
pub mod config;
pub mod document;
pub mod engine;
pub mod error;
pub mod invoker;
pub mod pipeline;
pub mod policy;
pub mod probe;
pub mod report;
pub mod util;
