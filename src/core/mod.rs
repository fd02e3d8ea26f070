pub mod backlog;
pub mod dispatcher;
pub mod error;
pub mod services;
pub mod traits;
