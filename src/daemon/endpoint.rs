use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::{Path, PathBuf};

/// Base of the TCP port range used where Unix sockets are unavailable.
pub const TCP_PORT_BASE: u16 = 49_152;
pub const TCP_PORT_SPAN: u32 = 10_000;
const HASH_LEN: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "transport", rename_all = "lowercase")]
pub enum DaemonAddress {
    Unix { path: PathBuf },
    Tcp { host: String, port: u16 },
}

impl fmt::Display for DaemonAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unix { path } => write!(f, "unix:{}", path.display()),
            Self::Tcp { host, port } => write!(f, "tcp:{host}:{port}"),
        }
    }
}

/// Where the daemon for one project listens, plus its lock and pid markers.
/// Every path derives from the same project hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DaemonEndpoint {
    pub project_dir: PathBuf,
    pub hash: String,
    pub address: DaemonAddress,
    pub lock_path: PathBuf,
    pub pid_path: PathBuf,
}

impl DaemonEndpoint {
    /// Resolves the endpoint for `project_dir` using the platform transport.
    #[must_use]
    pub fn resolve(project_dir: &Path, runtime_dir: &Path) -> Self {
        let project_dir = canonical(project_dir);
        let hash = project_hash(&project_dir);
        let address = if cfg!(unix) {
            DaemonAddress::Unix {
                path: runtime_dir.join(format!("tldr-{hash}.sock")),
            }
        } else {
            DaemonAddress::Tcp {
                host: "127.0.0.1".to_string(),
                port: tcp_port(&hash),
            }
        };
        Self {
            lock_path: runtime_dir.join(format!("tldr-{hash}.lock")),
            pid_path: runtime_dir.join(format!("tldr-{hash}.pid")),
            project_dir,
            hash,
            address,
        }
    }

    /// Same endpoint forced onto TCP.
    #[must_use]
    pub fn with_tcp(mut self) -> Self {
        self.address = DaemonAddress::Tcp {
            host: "127.0.0.1".to_string(),
            port: tcp_port(&self.hash),
        };
        self
    }
}

fn canonical(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

/// First eight hex digits of the SHA-256 of the project path.
#[must_use]
pub fn project_hash(project_dir: &Path) -> String {
    let mut hasher = Sha256::new();
    hasher.update(project_dir.to_string_lossy().as_bytes());
    let digest = format!("{:x}", hasher.finalize());
    digest.chars().take(HASH_LEN).collect()
}

/// Folds a project hash into `[49152, 59152)`.
#[must_use]
pub fn tcp_port(hash: &str) -> u16 {
    let value = u32::from_str_radix(hash, 16).unwrap_or(0);
    let offset = u16::try_from(value % TCP_PORT_SPAN).unwrap_or(0);
    TCP_PORT_BASE + offset
}

#[cfg(test)]
mod tests {
    use super::{project_hash, tcp_port, DaemonAddress, DaemonEndpoint, TCP_PORT_BASE};
    use std::path::Path;

    #[test]
    fn same_project_resolves_to_the_same_endpoint() {
        let runtime = Path::new("/tmp");
        let a = DaemonEndpoint::resolve(Path::new("/no/such/project"), runtime);
        let b = DaemonEndpoint::resolve(Path::new("/no/such/project"), runtime);
        assert_eq!(a, b);
        assert_eq!(a.hash.len(), 8);
    }

    #[test]
    fn different_projects_resolve_to_different_endpoints() {
        let runtime = Path::new("/tmp");
        let a = DaemonEndpoint::resolve(Path::new("/no/such/alpha"), runtime);
        let b = DaemonEndpoint::resolve(Path::new("/no/such/beta"), runtime);
        assert_ne!(a.address, b.address);
        assert_ne!(a.lock_path, b.lock_path);
        assert_ne!(a.pid_path, b.pid_path);
    }

    #[test]
    fn markers_share_the_hash_naming_scheme() {
        let endpoint = DaemonEndpoint::resolve(Path::new("/no/such/project"), Path::new("/run"));
        let hash = project_hash(Path::new("/no/such/project"));
        assert_eq!(endpoint.lock_path, Path::new("/run").join(format!("tldr-{hash}.lock")));
        assert_eq!(endpoint.pid_path, Path::new("/run").join(format!("tldr-{hash}.pid")));
        if cfg!(unix) {
            assert_eq!(
                endpoint.address,
                DaemonAddress::Unix {
                    path: Path::new("/run").join(format!("tldr-{hash}.sock"))
                }
            );
        }
    }

    #[test]
    fn tcp_port_stays_in_the_high_range() {
        for hash in ["00000000", "ffffffff", "0000270f", "00002710", "deadbeef"] {
            let port = tcp_port(hash);
            assert!((TCP_PORT_BASE..TCP_PORT_BASE + 10_000).contains(&port));
        }
        assert_eq!(tcp_port("00002710"), TCP_PORT_BASE);
        assert_eq!(tcp_port("0000270f"), TCP_PORT_BASE + 9_999);
    }

    #[test]
    fn forcing_tcp_keeps_marker_paths() {
        let unix = DaemonEndpoint::resolve(Path::new("/no/such/project"), Path::new("/tmp"));
        let tcp = unix.clone().with_tcp();
        assert_eq!(tcp.lock_path, unix.lock_path);
        assert!(matches!(tcp.address, DaemonAddress::Tcp { .. }));
    }
}
