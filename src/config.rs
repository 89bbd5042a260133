//! Process configuration from the environment.
//!
//! | variable | default | meaning |
//! |---|---|---|
//! | `HOST` | all interfaces | interface or host name to bind |
//! | `PORT` | `5000` | TCP port |
//!
//! ```rust,no_run
//! use glue::Config;
//!
//! let config = Config::from_env().unwrap();
//! println!("binding {}", config.addr());
//! ```

use std::env;

use crate::error::Error;

pub const DEFAULT_PORT: u16 = 5000;

/// Where [`Glue::listen`](crate::Glue::listen) binds.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    /// Empty means every interface.
    pub host: String,
    pub port: u16,
}

impl Config {
    /// Reads `HOST` and `PORT`.
    pub fn from_env() -> Result<Self, Error> {
        Self::from_vars(env::var("HOST").ok(), env::var("PORT").ok())
    }

    pub(crate) fn from_vars(host: Option<String>, port: Option<String>) -> Result<Self, Error> {
        let port = match port.as_deref().map(str::trim) {
            None | Some("") => DEFAULT_PORT,
            Some(raw) => raw.parse().map_err(|err: std::num::ParseIntError| Error::Config {
                name: "PORT",
                reason: format!("`{raw}`: {err}"),
            })?,
        };
        Ok(Self { host: host.unwrap_or_default().trim().to_owned(), port })
    }

    /// `host:port`, suitable for [`Server::bind`](crate::Server::bind).
    pub fn addr(&self) -> String {
        match self.host.as_str() {
            "" => format!("0.0.0.0:{}", self.port),
            host if host.contains(':') && !host.starts_with('[') => {
                format!("[{host}]:{}", self.port)
            }
            host => format!("{host}:{}", self.port),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self { host: String::new(), port: DEFAULT_PORT }
    }
}
