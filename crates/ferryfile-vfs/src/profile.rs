//! Saved connections, persisted as JSON next to the settings file.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use ferryfile_core::{APP_DIR, VfsError, VfsResult};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::drive::{DriveConfig, DriveProvider};
use crate::ftp::{FtpConfig, FtpProvider};
use crate::provider::VfsProvider;
use crate::sftp::{SftpAuth, SftpConfig, SftpProvider};
use crate::smb::{SmbConfig, SmbProvider};

const PROFILES_FILE: &str = "connections.json";

/// Network protocol of a saved connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Ftp,
    Sftp,
    Smb,
    Drive,
}

impl Protocol {
    pub fn default_port(self) -> Option<u16> {
        match self {
            Self::Ftp => Some(21),
            Self::Sftp => Some(22),
            Self::Smb => Some(445),
            Self::Drive => None,
        }
    }
}

/// One saved connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionProfile {
    pub name: String,
    pub protocol: Protocol,
    #[serde(default)]
    pub host: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    /// SMB share name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub share: Option<String>,
    /// SMB domain or workgroup.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial_path: Option<String>,
    /// SFTP private key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_path: Option<PathBuf>,
    /// Drive access token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

impl ConnectionProfile {
    pub fn new(name: impl Into<String>, protocol: Protocol, host: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            protocol,
            host: host.into(),
            port: None,
            username: None,
            password: None,
            share: None,
            domain: None,
            initial_path: None,
            key_path: None,
            token: None,
        }
    }

    /// Explicit port, or the protocol default.
    pub fn effective_port(&self) -> Option<u16> {
        self.port.or(self.protocol.default_port())
    }

    /// Directory to list right after connecting.
    pub fn start_path(&self) -> String {
        match (&self.initial_path, self.protocol) {
            (Some(path), _) if !path.is_empty() => path.clone(),
            (_, Protocol::Ftp | Protocol::Smb | Protocol::Drive) => "/".to_string(),
            (_, Protocol::Sftp) => ".".to_string(),
        }
    }

    /// Build an unconnected provider; the connection opens on first use.
    pub fn provider(&self, connect_timeout: Duration) -> VfsResult<Box<dyn VfsProvider>> {
        let port = self.effective_port().unwrap_or_default();
        let provider: Box<dyn VfsProvider> = match self.protocol {
            Protocol::Ftp => {
                let mut config = FtpConfig::new(&self.host).with_port(port);
                if let Some(user) = &self.username {
                    config = config.with_credentials(user, self.password.clone().unwrap_or_default());
                }
                Box::new(FtpProvider::new(config))
            }
            Protocol::Sftp => {
                let auth = match (&self.key_path, &self.password) {
                    (Some(key), passphrase) => SftpAuth::KeyFile {
                        private_key: key.clone(),
                        passphrase: passphrase.clone(),
                    },
                    (None, Some(password)) => SftpAuth::Password(password.clone()),
                    (None, None) => SftpAuth::Agent,
                };
                let user = self.username.clone().unwrap_or_else(whoami);
                let config = SftpConfig::new(&self.host, user, auth)
                    .with_port(port)
                    .with_connect_timeout(connect_timeout);
                Box::new(SftpProvider::new(config))
            }
            Protocol::Smb => {
                let share = self
                    .share
                    .clone()
                    .ok_or_else(|| VfsError::other(format!("Profile '{}' has no SMB share", self.name)))?;
                let mut config = SmbConfig::new(&self.host, share)
                    .with_port(port)
                    .with_domain(self.domain.clone());
                if let Some(user) = &self.username {
                    config = config.with_credentials(user, self.password.clone());
                }
                Box::new(SmbProvider::new(config))
            }
            Protocol::Drive => {
                let token = self.token.clone().ok_or_else(|| VfsError::Auth {
                    message: format!("Profile '{}' has no Drive access token", self.name),
                })?;
                Box::new(DriveProvider::new(DriveConfig::new(token).with_timeout(connect_timeout)))
            }
        };
        Ok(provider)
    }
}

fn whoami() -> String {
    std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "root".to_string())
}

/// The saved connection list.
#[derive(Debug, Default)]
pub struct ProfileStore {
    profiles: Vec<ConnectionProfile>,
    path: Option<PathBuf>,
}

impl ProfileStore {
    /// Default location of the profile file.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(APP_DIR).join(PROFILES_FILE))
    }

    /// Load from the default location.
    pub fn load() -> VfsResult<Self> {
        match Self::default_path() {
            Some(path) => Self::load_from(path),
            None => Ok(Self::default()),
        }
    }

    /// Load from `path`; a missing file is an empty store.
    pub fn load_from(path: impl Into<PathBuf>) -> VfsResult<Self> {
        let path = path.into();
        let profiles = match fs::read_to_string(&path) {
            Ok(content) => serde_json::from_str(&content).map_err(|e| {
                VfsError::other(format!("Invalid profile file {}: {}", path.display(), e))
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(VfsError::io(&path, e)),
        };
        debug!(path = %path.display(), "loaded connection profiles");
        Ok(Self {
            profiles,
            path: Some(path),
        })
    }

    /// Write back to where the store was loaded from.
    pub fn save(&self) -> VfsResult<()> {
        match self.path.clone().or_else(Self::default_path) {
            Some(path) => self.save_to(&path),
            None => Err(VfsError::other("No configuration directory available")),
        }
    }

    pub fn save_to(&self, path: &Path) -> VfsResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| VfsError::io(parent, e))?;
        }
        let content = serde_json::to_string_pretty(&self.profiles)
            .map_err(|e| VfsError::other(format!("Failed to serialize profiles: {}", e)))?;
        fs::write(path, content).map_err(|e| VfsError::io(path, e))
    }

    pub fn profiles(&self) -> &[ConnectionProfile] {
        &self.profiles
    }

    pub fn get(&self, name: &str) -> Option<&ConnectionProfile> {
        self.profiles.iter().find(|p| p.name == name)
    }

    /// Insert, replacing any profile with the same name.
    pub fn add_or_replace(&mut self, profile: ConnectionProfile) {
        match self.profiles.iter_mut().find(|p| p.name == profile.name) {
            Some(existing) => *existing = profile,
            None => self.profiles.push(profile),
        }
    }

    /// Returns whether a profile was removed.
    pub fn remove(&mut self, name: &str) -> bool {
        let before = self.profiles.len();
        self.profiles.retain(|p| p.name != name);
        self.profiles.len() != before
    }

    /// Provider for the named profile.
    pub fn connect(&self, name: &str, connect_timeout: Duration) -> VfsResult<Box<dyn VfsProvider>> {
        self.get(name)
            .ok_or_else(|| VfsError::not_found(format!("profile '{}'", name)))?
            .provider(connect_timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::ProviderKind;
    use tempfile::TempDir;

    fn sftp_profile() -> ConnectionProfile {
        ConnectionProfile {
            username: Some("deploy".into()),
            password: Some("secret".into()),
            ..ConnectionProfile::new("web", Protocol::Sftp, "web.example.org")
        }
    }

    #[test]
    fn test_round_trip_and_replace() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested").join(PROFILES_FILE);

        let mut store = ProfileStore::load_from(&path).unwrap();
        assert!(store.profiles().is_empty());

        store.add_or_replace(sftp_profile());
        store.add_or_replace(ConnectionProfile {
            port: Some(2222),
            ..sftp_profile()
        });
        store.save().unwrap();

        let reloaded = ProfileStore::load_from(&path).unwrap();
        assert_eq!(reloaded.profiles().len(), 1);
        assert_eq!(reloaded.get("web").unwrap().port, Some(2222));
    }

    #[test]
    fn test_remove() {
        let mut store = ProfileStore::default();
        store.add_or_replace(sftp_profile());
        assert!(store.remove("web"));
        assert!(!store.remove("web"));
    }

    #[test]
    fn test_connect_builds_provider() {
        let mut store = ProfileStore::default();
        store.add_or_replace(sftp_profile());
        let provider = store.connect("web", Duration::from_secs(5)).unwrap();
        assert_eq!(provider.kind(), ProviderKind::Sftp);
        assert_eq!(provider.display_name(), "sftp://deploy@web.example.org");

        let missing = store.connect("nope", Duration::from_secs(5));
        assert!(matches!(missing, Err(VfsError::NotFound { .. })));
    }

    #[test]
    fn test_defaults() {
        let smb = ConnectionProfile::new("nas", Protocol::Smb, "nas.local");
        assert_eq!(smb.effective_port(), Some(445));
        assert_eq!(smb.start_path(), "/");
        assert!(smb.provider(Duration::from_secs(1)).is_err());

        let drive = ConnectionProfile::new("drive", Protocol::Drive, "");
        assert!(matches!(
            drive.provider(Duration::from_secs(1)),
            Err(VfsError::Auth { .. })
        ));
    }

    #[test]
    fn test_invalid_file_is_an_error() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(PROFILES_FILE);
        fs::write(&path, "{not json").unwrap();
        assert!(ProfileStore::load_from(&path).is_err());
    }
}
