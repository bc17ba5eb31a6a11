//! Configuration management.

mod settings;
mod xdg;

pub use settings::{
    ClientConfig, ConfigError, TransportMode, ENV_API_URL, ENV_CONNECT_TIMEOUT, ENV_TRANSPORT,
    ENV_WS_URL,
};
pub use xdg::XdgDirs;
