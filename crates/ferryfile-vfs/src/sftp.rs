//! SFTP provider built on ssh2.

use std::fs::File;
use std::io;
use std::net::{TcpStream, ToSocketAddrs};
use std::path::{Path, PathBuf};
use std::time::Duration;

use ferryfile_core::{FileEntry, VfsError, VfsResult, permissions_text};
use ssh2::{FileStat, Session, Sftp};
use tracing::{info, warn};

use crate::path;
use crate::provider::{ProviderKind, VfsProvider};
use crate::tree::{self, TreeRemoval};

/// SFTP status codes from the protocol draft.
const SFTP_NO_SUCH_FILE: i32 = 2;
const SFTP_PERMISSION_DENIED: i32 = 3;

/// How to authenticate against the SSH server.
#[derive(Debug, Clone)]
pub enum SftpAuth {
    Password(String),
    KeyFile {
        private_key: PathBuf,
        passphrase: Option<String>,
    },
    Agent,
}

/// Connection parameters for an SFTP server.
#[derive(Debug, Clone)]
pub struct SftpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub auth: SftpAuth,
    pub connect_timeout: Duration,
}

impl SftpConfig {
    pub fn new(host: impl Into<String>, username: impl Into<String>, auth: SftpAuth) -> Self {
        Self {
            host: host.into(),
            port: 22,
            username: username.into(),
            auth,
            connect_timeout: Duration::from_secs(30),
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}

struct Connection {
    session: Session,
    sftp: Sftp,
}

/// SFTP backend. The SSH session is opened on first use and reopened
/// whenever `stat(".")` stops answering.
pub struct SftpProvider {
    config: SftpConfig,
    connection: Option<Connection>,
    location: String,
}

impl SftpProvider {
    pub fn new(config: SftpConfig) -> Self {
        Self {
            config,
            connection: None,
            location: ".".to_string(),
        }
    }

    fn connect(&self) -> VfsResult<Connection> {
        let addr = (self.config.host.as_str(), self.config.port)
            .to_socket_addrs()
            .map_err(|e| VfsError::connection(format!("Cannot resolve {}: {}", self.config.host, e)))?
            .next()
            .ok_or_else(|| VfsError::connection(format!("No address for {}", self.config.host)))?;

        let tcp = TcpStream::connect_timeout(&addr, self.config.connect_timeout)
            .map_err(|e| VfsError::connection(format!("Failed to connect to {}: {}", addr, e)))?;

        let mut session = Session::new()
            .map_err(|e| VfsError::connection(format!("Failed to create session: {}", e)))?;
        session.set_tcp_stream(tcp);
        session
            .handshake()
            .map_err(|e| VfsError::connection(format!("SSH handshake failed: {}", e)))?;

        // Keepalive every 10 seconds so idle panels do not get dropped.
        session.set_keepalive(true, 10);

        self.authenticate(&session)?;

        let sftp = session
            .sftp()
            .map_err(|e| VfsError::connection(format!("Failed to open SFTP: {}", e)))?;

        info!(host = %self.config.host, user = %self.config.username, "SFTP connected");
        Ok(Connection { session, sftp })
    }

    fn authenticate(&self, session: &Session) -> VfsResult<()> {
        let user = &self.config.username;
        let auth_error = |message: String| VfsError::Auth { message };

        match &self.config.auth {
            SftpAuth::Password(password) => session
                .userauth_password(user, password)
                .map_err(|e| auth_error(format!("Password auth failed: {}", e)))?,
            SftpAuth::KeyFile {
                private_key,
                passphrase,
            } => session
                .userauth_pubkey_file(user, None, private_key, passphrase.as_deref())
                .map_err(|e| auth_error(format!("Key auth failed: {}", e)))?,
            SftpAuth::Agent => {
                let mut agent = session
                    .agent()
                    .map_err(|e| auth_error(format!("SSH agent unavailable: {}", e)))?;
                agent
                    .connect()
                    .map_err(|e| auth_error(format!("SSH agent unavailable: {}", e)))?;
                agent
                    .list_identities()
                    .map_err(|e| auth_error(format!("Failed to list agent identities: {}", e)))?;

                let identities = agent.identities().unwrap_or_default();
                if !identities
                    .iter()
                    .any(|identity| agent.userauth(user, identity).is_ok())
                {
                    return Err(auth_error("No valid identity found in SSH agent".to_string()));
                }
            }
        }

        if session.authenticated() {
            Ok(())
        } else {
            Err(auth_error("Authentication failed".to_string()))
        }
    }

    /// Live SFTP channel, reconnecting if the previous one went stale.
    fn sftp(&mut self) -> VfsResult<&Sftp> {
        let alive = match &self.connection {
            Some(conn) => conn.sftp.stat(Path::new(".")).is_ok(),
            None => false,
        };

        if !alive {
            if self.connection.take().is_some() {
                warn!(host = %self.config.host, "SFTP session lost, reconnecting");
            }
            self.connection = Some(self.connect()?);
        }

        self.connection
            .as_ref()
            .map(|conn| &conn.sftp)
            .ok_or_else(|| VfsError::connection("SFTP session closed"))
    }

    fn read_dir(&mut self, dir: &str) -> VfsResult<Vec<FileEntry>> {
        let sftp = self.sftp()?;
        let listing = sftp
            .readdir(Path::new(dir))
            .map_err(|e| map_ssh_error(e, dir))?;

        Ok(listing
            .into_iter()
            .filter_map(|(entry_path, stat)| {
                let name = entry_path.file_name()?.to_string_lossy().into_owned();
                if name == "." || name == ".." {
                    return None;
                }
                let full_path = path::join(dir, &name);
                Some(entry_from_stat(name, full_path, &stat))
            })
            .collect())
    }
}

fn entry_from_stat(name: String, full_path: String, stat: &FileStat) -> FileEntry {
    let modified = stat.mtime.unwrap_or(0) as i64;
    let entry = if stat.is_dir() {
        FileEntry::directory(name, full_path, modified)
    } else {
        FileEntry::file(name, full_path, stat.size.unwrap_or(0), modified)
    };
    entry.with_posix(
        stat.uid.map(|uid| uid.to_string()),
        stat.gid.map(|gid| gid.to_string()),
        stat.perm.map(permissions_text),
    )
}

fn map_ssh_error(e: ssh2::Error, target: &str) -> VfsError {
    match e.code() {
        ssh2::ErrorCode::SFTP(SFTP_NO_SUCH_FILE) => VfsError::not_found(target),
        ssh2::ErrorCode::SFTP(SFTP_PERMISSION_DENIED) => VfsError::permission_denied(target),
        ssh2::ErrorCode::Session(_) => VfsError::connection(e.to_string()),
        _ => VfsError::other(format!("{}: {}", target, e)),
    }
}

impl VfsProvider for SftpProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Sftp
    }

    fn display_name(&self) -> String {
        if self.config.port != 22 {
            format!("sftp://{}@{}:{}", self.config.username, self.config.host, self.config.port)
        } else {
            format!("sftp://{}@{}", self.config.username, self.config.host)
        }
    }

    fn list_directory(&mut self, dir: &str) -> VfsResult<Vec<FileEntry>> {
        let dir = if dir.is_empty() { "." } else { dir };
        let listing = self.read_dir(dir)?;
        self.location = dir.to_string();
        Ok(listing)
    }

    fn fetch_to_local(&mut self, remote_path: &str, local_dir: &Path) -> VfsResult<PathBuf> {
        let name = tree::safe_name(path::basename(remote_path))?;
        let dest = local_dir.join(name);

        let sftp = self.sftp()?;
        let mut remote = sftp
            .open(Path::new(remote_path))
            .map_err(|e| map_ssh_error(e, remote_path))?;
        let mut local = File::create(&dest).map_err(|e| VfsError::io(&dest, e))?;
        io::copy(&mut remote, &mut local).map_err(|e| VfsError::io(&dest, e))?;

        Ok(dest)
    }

    fn push_from_local(&mut self, local_path: &Path, remote_dest: &str) -> VfsResult<()> {
        let mut local = File::open(local_path).map_err(|e| VfsError::io(local_path, e))?;

        let sftp = self.sftp()?;
        let mut remote = sftp
            .create(Path::new(remote_dest))
            .map_err(|e| map_ssh_error(e, remote_dest))?;
        io::copy(&mut local, &mut remote)
            .map_err(|e| VfsError::connection(format!("Upload of {} failed: {}", remote_dest, e)))?;

        Ok(())
    }

    fn delete(&mut self, target: &str, is_directory: bool) -> VfsResult<()> {
        if is_directory {
            tree::remove_tree(self, target)
        } else {
            self.remove_file(target)
        }
    }

    fn make_directory(&mut self, dir: &str) -> VfsResult<()> {
        self.sftp()?
            .mkdir(Path::new(dir), 0o755)
            .map_err(|e| map_ssh_error(e, dir))
    }

    fn fetch_all(&mut self, dest_dir: &Path) -> VfsResult<()> {
        let location = self.location.clone();
        tree::mirror(self, &location, dest_dir)
    }

    fn close(&mut self) {
        if let Some(conn) = self.connection.take() {
            drop(conn.sftp);
            let _ = conn.session.disconnect(None, "Goodbye", None);
        }
    }

    fn supports_rename(&self) -> bool {
        true
    }

    fn rename(&mut self, from: &str, to: &str) -> VfsResult<()> {
        self.sftp()?
            .rename(Path::new(from), Path::new(to), None)
            .map_err(|e| map_ssh_error(e, from))
    }

    fn stat(&mut self, target: &str) -> VfsResult<Option<FileEntry>> {
        let sftp = self.sftp()?;
        match sftp.stat(Path::new(target)) {
            Ok(stat) => {
                let name = path::basename(target).to_string();
                Ok(Some(entry_from_stat(name, target.to_string(), &stat)))
            }
            Err(e) if matches!(e.code(), ssh2::ErrorCode::SFTP(SFTP_NO_SUCH_FILE)) => Ok(None),
            Err(e) => Err(map_ssh_error(e, target)),
        }
    }
}

impl TreeRemoval for SftpProvider {
    fn children(&mut self, dir: &str) -> VfsResult<Vec<FileEntry>> {
        self.read_dir(dir)
    }

    fn remove_file(&mut self, target: &str) -> VfsResult<()> {
        self.sftp()?
            .unlink(Path::new(target))
            .map_err(|e| map_ssh_error(e, target))
    }

    fn remove_empty_dir(&mut self, dir: &str) -> VfsResult<()> {
        self.sftp()?
            .rmdir(Path::new(dir))
            .map_err(|e| map_ssh_error(e, dir))
    }
}

impl Drop for SftpProvider {
    fn drop(&mut self) {
        self.close();
    }
}
