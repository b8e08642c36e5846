// Cat Registry - Core Library
// Exposes all modules for use in the CLI, the API server, and tests

pub mod cat;
pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod mapper;
pub mod service;

#[cfg(feature = "server")]
pub mod api;

// Re-export commonly used types
pub use cat::Cat;
pub use config::Config;
pub use db::{get_events_for_entity, insert_event, load_csv, setup_database, Event, SqliteCatMapper};
pub use error::{CatServiceError, ServiceResult};
pub use logging::init_tracing;
pub use mapper::CatMapper;
pub use service::CatService;
