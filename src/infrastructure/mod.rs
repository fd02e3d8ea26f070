pub mod backend;
pub mod config;
pub mod entities;
pub mod transport;
