//! Runtime settings, read from the environment (and `.env`, if present).

use di::{inject, injectable};
use log::warn;
use std::env;
use std::str::FromStr;

#[derive(Debug, Clone)]
pub struct Settings {
    pub database_url: String,
    pub database_max_connections: u32,
    pub bind_address: String,
    pub allowed_origins: Vec<String>,
    pub default_page_size: u32,
    pub max_page_size: u32,
    pub max_message_length: usize,
    pub event_buffer: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            database_url: "sqlite://chat.db".to_owned(),
            database_max_connections: 5,
            bind_address: "0.0.0.0:3000".to_owned(),
            allowed_origins: vec![
                "http://localhost:3000".to_owned(),
                "http://localhost:5173".to_owned(),
            ],
            default_page_size: 30,
            max_page_size: 100,
            max_message_length: 4096,
            event_buffer: 256,
        }
    }
}

#[injectable]
impl Settings {
    #[inject]
    pub fn create() -> Settings {
        Settings::from_env()
    }
}

impl Settings {
    /// Reads every setting from the environment, keeping the default for unset or
    /// unparsable values.
    pub fn from_env() -> Settings {
        dotenvy::dotenv().ok();
        let defaults = Settings::default();

        Settings {
            database_url: env::var("DATABASE_URL").unwrap_or(defaults.database_url),
            database_max_connections: parsed_var(
                "DATABASE_MAX_CONNECTIONS",
                defaults.database_max_connections,
            ),
            bind_address: env::var("BIND_ADDRESS").unwrap_or(defaults.bind_address),
            allowed_origins: env::var("ALLOWED_ORIGINS")
                .map(|origins| split_list(&origins))
                .unwrap_or(defaults.allowed_origins),
            default_page_size: parsed_var("DEFAULT_PAGE_SIZE", defaults.default_page_size),
            max_page_size: parsed_var("MAX_PAGE_SIZE", defaults.max_page_size),
            max_message_length: parsed_var("MAX_MESSAGE_LENGTH", defaults.max_message_length),
            event_buffer: parsed_var("EVENT_BUFFER", defaults.event_buffer),
        }
    }
}

fn parsed_var<T>(name: &str, default: T) -> T
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|e| {
            warn!("ignoring {name}={raw:?}: {e}");
            default
        }),
        Err(_) => default,
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_owned)
        .collect()
}
