use std::io;
use std::path::PathBuf;

/// Filesystem locations for the daemon's runtime state: the socket it
/// listens on and its pid file, both inside one per-user runtime
/// directory.
#[derive(Debug, Clone)]
pub struct Config {
    pub runtime_dir: PathBuf,
    pub socket_path: PathBuf,
    pub pid_path: PathBuf,
}

impl Config {
    /// Resolves the runtime directory: `$SPOOLQ_RUNTIME_DIR` when set,
    /// else the platform runtime dir (`$XDG_RUNTIME_DIR/spoolq`), else a
    /// per-uid directory under the system temp dir.
    pub fn from_env() -> Self {
        let runtime_dir = std::env::var_os("SPOOLQ_RUNTIME_DIR")
            .map(PathBuf::from)
            .or_else(|| dirs::runtime_dir().map(|d| d.join("spoolq")))
            .unwrap_or_else(|| {
                let uid = unsafe { libc::getuid() };
                std::env::temp_dir().join(format!("spoolq-{}", uid))
            });
        Self::in_dir(runtime_dir)
    }

    pub fn in_dir(runtime_dir: PathBuf) -> Self {
        Self {
            socket_path: runtime_dir.join("spoolq.sock"),
            pid_path: runtime_dir.join("spoolq.pid"),
            runtime_dir,
        }
    }

    /// Creates the runtime directory with owner-only permissions.
    pub fn ensure_runtime_dir(&self) -> io::Result<()> {
        std::fs::create_dir_all(&self.runtime_dir)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&self.runtime_dir, std::fs::Permissions::from_mode(0o700))?;
        }
        Ok(())
    }

    pub fn write_pid(&self) -> io::Result<()> {
        std::fs::write(&self.pid_path, std::process::id().to_string())
    }

    pub fn read_pid(&self) -> Option<u32> {
        std::fs::read_to_string(&self.pid_path)
            .ok()
            .and_then(|s| s.trim().parse().ok())
    }

    pub fn remove_pid(&self) -> io::Result<()> {
        match std::fs::remove_file(&self.pid_path) {
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            other => other,
        }
    }

    pub fn remove_socket(&self) -> io::Result<()> {
        match std::fs::remove_file(&self.socket_path) {
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            other => other,
        }
    }

    /// The pid from the pid file, but only while that process is still
    /// alive (signal-0 probe). A stale pid file reports `None`.
    pub fn live_daemon_pid(&self) -> Option<u32> {
        let pid = self.read_pid()?;
        let alive = unsafe { libc::kill(pid as i32, 0) == 0 };
        alive.then_some(pid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn paths_live_in_the_runtime_dir() {
        let config = Config::in_dir(PathBuf::from("/run/user/1000/spoolq"));
        assert_eq!(
            config.socket_path,
            PathBuf::from("/run/user/1000/spoolq/spoolq.sock")
        );
        assert_eq!(
            config.pid_path,
            PathBuf::from("/run/user/1000/spoolq/spoolq.pid")
        );
    }

    #[test]
    fn env_override_wins() {
        let temp_dir = TempDir::new().unwrap();
        std::env::set_var("SPOOLQ_RUNTIME_DIR", temp_dir.path());
        let config = Config::from_env();
        assert_eq!(config.runtime_dir, temp_dir.path());
        std::env::remove_var("SPOOLQ_RUNTIME_DIR");
    }

    #[test]
    fn pid_roundtrip() {
        let temp_dir = TempDir::new().unwrap();
        let config = Config::in_dir(temp_dir.path().to_path_buf());
        config.write_pid().unwrap();
        assert_eq!(config.read_pid(), Some(std::process::id()));
        // Our own process is alive, so the pid file counts as live.
        assert_eq!(config.live_daemon_pid(), Some(std::process::id()));
        config.remove_pid().unwrap();
        assert!(config.read_pid().is_none());
        assert!(config.live_daemon_pid().is_none());
    }

    #[test]
    fn removing_missing_files_is_fine() {
        let temp_dir = TempDir::new().unwrap();
        let config = Config::in_dir(temp_dir.path().to_path_buf());
        config.remove_pid().unwrap();
        config.remove_socket().unwrap();
    }

    #[cfg(unix)]
    #[test]
    fn runtime_dir_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = TempDir::new().unwrap();
        let config = Config::in_dir(temp_dir.path().join("runtime"));
        config.ensure_runtime_dir().unwrap();
        let mode = std::fs::metadata(&config.runtime_dir)
            .unwrap()
            .permissions()
            .mode()
            & 0o777;
        assert_eq!(mode, 0o700);
    }
}
