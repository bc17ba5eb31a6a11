//! XDG Base Directory support.

use std::path::PathBuf;

const APP_DIR: &str = "chatrelay";

/// XDG directory paths for chatrelay.
pub struct XdgDirs {
    /// Config directory (~/.config/chatrelay or XDG_CONFIG_HOME/chatrelay)
    pub config: PathBuf,
    /// State directory (~/.local/state/chatrelay or XDG_STATE_HOME/chatrelay)
    pub state: PathBuf,
}

impl XdgDirs {
    /// Get XDG directories, respecting environment variables.
    pub fn new() -> Self {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));

        Self {
            config: std::env::var("XDG_CONFIG_HOME")
                .map(PathBuf::from)
                .unwrap_or_else(|_| home.join(".config"))
                .join(APP_DIR),
            state: std::env::var("XDG_STATE_HOME")
                .map(PathBuf::from)
                .unwrap_or_else(|_| home.join(".local/state"))
                .join(APP_DIR),
        }
    }

    /// `config.json` inside the config directory.
    pub fn config_file(&self) -> PathBuf {
        self.config.join("config.json")
    }

    /// REPL history file inside the state directory.
    pub fn history_file(&self) -> PathBuf {
        self.state.join("history.txt")
    }

    /// Ensure all directories exist.
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        for dir in [&self.config, &self.state] {
            std::fs::create_dir_all(dir)?;
        }
        Ok(())
    }
}

impl Default for XdgDirs {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::env;
    use std::sync::{Mutex, MutexGuard};
    use tempfile::TempDir;

    // =========================================================================
    // Test Helpers
    // =========================================================================

    /// Serialises tests that touch process-wide environment variables.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    /// Temporarily set environment variables, restoring them on drop.
    pub(crate) struct EnvGuard {
        vars: Vec<(String, Option<String>)>,
        _lock: MutexGuard<'static, ()>,
    }

    impl EnvGuard {
        pub(crate) fn new(vars: &[(&str, &str)]) -> Self {
            let lock = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
            let mut saved = Vec::new();
            for (key, value) in vars {
                saved.push((key.to_string(), env::var(key).ok()));
                env::set_var(key, value);
            }
            Self {
                vars: saved,
                _lock: lock,
            }
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            for (key, original) in &self.vars {
                match original {
                    Some(val) => env::set_var(key, val),
                    None => env::remove_var(key),
                }
            }
        }
    }

    // =========================================================================
    // Path Tests
    // =========================================================================

    #[test]
    fn test_xdg_dirs_end_with_app_dir() {
        let dirs = XdgDirs::new();
        assert!(dirs.config.ends_with("chatrelay"), "{:?}", dirs.config);
        assert!(dirs.state.ends_with("chatrelay"), "{:?}", dirs.state);
        assert_ne!(dirs.config, dirs.state);
    }

    #[test]
    fn test_xdg_overrides() {
        let temp = TempDir::new().unwrap();
        let _guard = EnvGuard::new(&[
            ("XDG_CONFIG_HOME", temp.path().join("cfg").to_str().unwrap()),
            ("XDG_STATE_HOME", temp.path().join("state").to_str().unwrap()),
        ]);

        let dirs = XdgDirs::new();
        assert_eq!(dirs.config, temp.path().join("cfg").join("chatrelay"));
        assert_eq!(dirs.state, temp.path().join("state").join("chatrelay"));
        assert_eq!(
            dirs.config_file(),
            temp.path().join("cfg").join("chatrelay").join("config.json")
        );
        assert!(dirs.history_file().ends_with("history.txt"));
    }

    // =========================================================================
    // Directory Creation Tests
    // =========================================================================

    #[test]
    fn test_ensure_dirs_creates_and_is_idempotent() {
        let temp = TempDir::new().unwrap();
        let dirs = XdgDirs {
            config: temp.path().join("a").join("chatrelay"),
            state: temp.path().join("b").join("chatrelay"),
        };

        assert!(!dirs.config.exists());
        dirs.ensure_dirs().unwrap();
        dirs.ensure_dirs().unwrap();
        assert!(dirs.config.is_dir());
        assert!(dirs.state.is_dir());
    }

    #[test]
    fn test_ensure_dirs_fails_when_path_is_file() {
        let temp = TempDir::new().unwrap();
        let file_path = temp.path().join("not_a_dir");
        std::fs::write(&file_path, "blocking file").unwrap();

        let dirs = XdgDirs {
            config: file_path.join("chatrelay"),
            state: temp.path().join("state"),
        };
        assert!(dirs.ensure_dirs().is_err());
    }
}
