use std::net::SocketAddr;
use std::path::PathBuf;

/// Server configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Catalog text file, rewritten when the host uploads a new catalog
    pub clips_path: PathBuf,
    pub bind_addr: SocketAddr,
    /// Directory served for everything that is not an API route
    pub static_dir: PathBuf,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            clips_path: PathBuf::from("clips.txt"),
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8000)),
            static_dir: PathBuf::from("static"),
        }
    }
}

impl AppConfig {
    /// Load config from environment variables, falling back to defaults
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let clips_path = std::env::var("CLIPS_PATH")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or(defaults.clips_path);

        let bind_addr = match std::env::var("BIND_ADDR") {
            Ok(raw) => raw.parse().unwrap_or_else(|e| {
                tracing::warn!("Invalid BIND_ADDR {:?}: {}. Using default.", raw, e);
                defaults.bind_addr
            }),
            Err(_) => defaults.bind_addr,
        };

        let static_dir = std::env::var("STATIC_DIR")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or(defaults.static_dir);

        Self {
            clips_path,
            bind_addr,
            static_dir,
        }
    }
}
