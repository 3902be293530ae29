//! Shared state for the static bundle server.
//!
//! DESIGN
//! ======
//! `AppState` is injected into Axum handlers via the `State` extractor. It is
//! read-only after startup: the bundle directory, the advertised port and the
//! process start instant used for `uptime`.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

const DEFAULT_STATIC_DIR: &str = "build";
const DEFAULT_PORT: u16 = 3000;

#[derive(Debug)]
pub struct ServerConfig {
    pub static_dir: PathBuf,
    pub port: u16,
}

impl ServerConfig {
    /// `STATIC_DIR` and `PORT`, with defaults when unset or unparseable.
    pub fn from_env() -> Self {
        Self {
            static_dir: std::env::var("STATIC_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(DEFAULT_STATIC_DIR)),
            port: env_parse("PORT", DEFAULT_PORT),
        }
    }
}

fn env_parse<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr + Copy,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

#[derive(Clone)]
pub struct AppState {
    inner: Arc<Inner>,
}

struct Inner {
    config: ServerConfig,
    started: Instant,
}

impl AppState {
    pub fn new(config: ServerConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                started: Instant::now(),
            }),
        }
    }

    pub fn static_dir(&self) -> &PathBuf {
        &self.inner.config.static_dir
    }

    pub fn port(&self) -> u16 {
        self.inner.config.port
    }

    /// Seconds since the state was created.
    pub fn uptime(&self) -> f64 {
        self.inner.started.elapsed().as_secs_f64()
    }
}
