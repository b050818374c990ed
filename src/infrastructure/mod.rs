pub mod database;
pub mod entities;
pub mod files;
pub mod repositories;
pub mod traits;
