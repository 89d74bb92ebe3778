pub mod args;
pub mod database;
pub mod messaging;
pub mod model;
pub mod scheduler;
pub mod utils;
