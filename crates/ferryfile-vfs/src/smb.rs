//! SMB provider driving the system `smbclient` tool.
//!
//! Every call runs one `smbclient -c` command, so there is no session to
//! keep alive; a failed command simply surfaces as an error and the next call
//! starts fresh. Paths are share-relative and `/`-separated.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::LazyLock;

use chrono::{Local, NaiveDateTime, TimeZone};
use ferryfile_core::{FileEntry, VfsError, VfsResult};
use regex::Regex;
use tracing::debug;

use crate::path;
use crate::provider::{ProviderKind, VfsProvider};
use crate::tree::{self, TreeRemoval};

/// One line of `smbclient ls` output.
static LS_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^\s+(?P<name>.+?)\s+(?P<attrs>[ADHSRNVLIO]*)\s+(?P<size>\d+)\s+(?P<date>\w{3}\s+\w{3}\s+\d{1,2}\s+\d{2}:\d{2}:\d{2}\s+\d{4})\s*$",
    )
    .expect("valid ls regex")
});

/// Connection parameters for an SMB share.
#[derive(Debug, Clone)]
pub struct SmbConfig {
    pub host: String,
    pub share: String,
    pub port: u16,
    pub username: String,
    pub password: Option<String>,
    pub domain: Option<String>,
    /// Override for the `smbclient` executable.
    pub smbclient: PathBuf,
}

impl SmbConfig {
    pub fn new(host: impl Into<String>, share: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            share: share.into(),
            port: 445,
            username: "guest".to_string(),
            password: None,
            domain: None,
            smbclient: PathBuf::from("smbclient"),
        }
    }

    pub fn with_credentials(mut self, username: impl Into<String>, password: Option<String>) -> Self {
        self.username = username.into();
        self.password = password;
        self
    }

    pub fn with_domain(mut self, domain: Option<String>) -> Self {
        self.domain = domain.filter(|d| !d.is_empty());
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }
}

/// SMB backend.
pub struct SmbProvider {
    config: SmbConfig,
    location: String,
}

impl SmbProvider {
    pub fn new(config: SmbConfig) -> Self {
        Self {
            config,
            location: String::new(),
        }
    }

    /// Run one smbclient command against `target` and return its stdout.
    fn run(&self, command: &str, target: &str) -> VfsResult<String> {
        let service = format!("//{}/{}", self.config.host, self.config.share);
        let mut cmd = Command::new(&self.config.smbclient);
        cmd.arg(&service)
            .arg("-p")
            .arg(self.config.port.to_string())
            .arg("-U")
            .arg(&self.config.username)
            .arg("-c")
            .arg(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        if let Some(domain) = &self.config.domain {
            cmd.arg("-W").arg(domain);
        }
        match &self.config.password {
            // Keeps the secret out of the process list.
            Some(password) => {
                cmd.env("PASSWD", password);
            }
            None => {
                cmd.arg("-N");
            }
        }

        debug!(service = %service, command, "running smbclient");
        let output = cmd.output().map_err(|e| {
            VfsError::connection(format!(
                "Failed to run {}: {}",
                self.config.smbclient.display(),
                e
            ))
        })?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr);
        let combined = format!("{}\n{}", stdout, stderr);

        if let Some(err) = map_nt_status(&combined, target) {
            return Err(err);
        }
        if !output.status.success() {
            let message = if stderr.trim().is_empty() {
                stdout.trim().to_string()
            } else {
                stderr.trim().to_string()
            };
            return Err(VfsError::protocol(format!("smbclient failed: {}", message)));
        }

        Ok(stdout)
    }

    fn read_dir(&self, dir: &str) -> VfsResult<Vec<FileEntry>> {
        let pattern = format!("{}\\*", smb_path(dir)?.trim_end_matches('\\'));
        let output = self.run(&format!("ls {}", quote(&pattern)), dir)?;
        Ok(parse_ls_output(&output, dir))
    }
}

/// Share-relative `/` path to smbclient's `\` form.
fn smb_path(path: &str) -> VfsResult<String> {
    if path.contains('"') {
        return Err(VfsError::protocol(format!(
            "Path '{}' cannot be passed to smbclient",
            path
        )));
    }
    let trimmed = path.trim_matches('/');
    Ok(format!("\\{}", trimmed.replace('/', "\\")))
}

fn quote(arg: &str) -> String {
    format!("\"{}\"", arg)
}

/// Translate `NT_STATUS_*` codes found in smbclient output.
fn map_nt_status(output: &str, target: &str) -> Option<VfsError> {
    let status = output
        .split_whitespace()
        .find(|word| word.starts_with("NT_STATUS_"))?;
    let status = status.trim_end_matches(|c: char| !c.is_ascii_alphanumeric() && c != '_');

    Some(match status {
        "NT_STATUS_OBJECT_NAME_NOT_FOUND"
        | "NT_STATUS_OBJECT_PATH_NOT_FOUND"
        | "NT_STATUS_NO_SUCH_FILE"
        | "NT_STATUS_NOT_FOUND" => VfsError::not_found(target),
        "NT_STATUS_ACCESS_DENIED" | "NT_STATUS_SHARING_VIOLATION" => {
            VfsError::permission_denied(target)
        }
        "NT_STATUS_LOGON_FAILURE" | "NT_STATUS_ACCOUNT_DISABLED" => VfsError::Auth {
            message: status.to_string(),
        },
        "NT_STATUS_CONNECTION_REFUSED"
        | "NT_STATUS_HOST_UNREACHABLE"
        | "NT_STATUS_IO_TIMEOUT"
        | "NT_STATUS_BAD_NETWORK_NAME"
        | "NT_STATUS_CONNECTION_RESET" => VfsError::connection(status.to_string()),
        other => VfsError::protocol(format!("{} ({})", other, target)),
    })
}

/// Parse `smbclient ls` output into entries under `dir`.
pub fn parse_ls_output(output: &str, dir: &str) -> Vec<FileEntry> {
    output
        .lines()
        .filter_map(|line| {
            let caps = LS_LINE.captures(line)?;
            let name = caps.name("name")?.as_str().trim_end();
            if name == "." || name == ".." {
                return None;
            }
            let attrs = caps.name("attrs").map(|m| m.as_str()).unwrap_or("");
            let size = caps.name("size")?.as_str().parse().unwrap_or(0);
            let modified = caps
                .name("date")
                .and_then(|m| parse_ls_date(m.as_str()))
                .unwrap_or(0);

            let full_path = path::join(dir, name);
            Some(if attrs.contains('D') {
                FileEntry::directory(name, full_path, modified)
            } else {
                FileEntry::file(name, full_path, size, modified)
            })
        })
        .collect()
}

/// `Mon Jan  1 12:00:00 2024`, in the server's local time.
fn parse_ls_date(raw: &str) -> Option<i64> {
    let normalized = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    let naive = NaiveDateTime::parse_from_str(&normalized, "%a %b %d %H:%M:%S %Y").ok()?;
    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.timestamp())
}

impl VfsProvider for SmbProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Smb
    }

    fn display_name(&self) -> String {
        format!(
            "smb://{}@{}/{}",
            self.config.username, self.config.host, self.config.share
        )
    }

    fn list_directory(&mut self, dir: &str) -> VfsResult<Vec<FileEntry>> {
        let listing = self.read_dir(dir)?;
        self.location = dir.to_string();
        Ok(listing)
    }

    fn fetch_to_local(&mut self, remote_path: &str, local_dir: &Path) -> VfsResult<PathBuf> {
        let name = tree::safe_name(path::basename(remote_path))?;
        let dest = local_dir.join(name);
        let local = dest.to_string_lossy();
        if local.contains('"') {
            return Err(VfsError::protocol(format!("Local path '{}' cannot be passed to smbclient", local)));
        }

        self.run(&format!(
            "get {} {}",
            quote(&smb_path(remote_path)?),
            quote(&local)
        ), remote_path)?;
        Ok(dest)
    }

    fn push_from_local(&mut self, local_path: &Path, remote_dest: &str) -> VfsResult<()> {
        let local = local_path.to_string_lossy();
        if local.contains('"') {
            return Err(VfsError::protocol(format!("Local path '{}' cannot be passed to smbclient", local)));
        }
        self.run(&format!(
            "put {} {}",
            quote(&local),
            quote(&smb_path(remote_dest)?)
        ), remote_dest)
        .map(|_| ())
    }

    fn delete(&mut self, target: &str, is_directory: bool) -> VfsResult<()> {
        if is_directory {
            tree::remove_tree(self, target)
        } else {
            self.remove_file(target)
        }
    }

    fn make_directory(&mut self, dir: &str) -> VfsResult<()> {
        self.run(&format!("mkdir {}", quote(&smb_path(dir)?)), dir)
            .map(|_| ())
    }

    fn fetch_all(&mut self, dest_dir: &Path) -> VfsResult<()> {
        let location = self.location.clone();
        tree::mirror(self, &location, dest_dir)
    }

    fn close(&mut self) {}

    fn supports_rename(&self) -> bool {
        true
    }

    fn rename(&mut self, from: &str, to: &str) -> VfsResult<()> {
        self.run(&format!(
            "rename {} {}",
            quote(&smb_path(from)?),
            quote(&smb_path(to)?)
        ), from)
        .map(|_| ())
    }
}

impl TreeRemoval for SmbProvider {
    fn children(&mut self, dir: &str) -> VfsResult<Vec<FileEntry>> {
        self.read_dir(dir)
    }

    fn remove_file(&mut self, target: &str) -> VfsResult<()> {
        self.run(&format!("del {}", quote(&smb_path(target)?)), target)
            .map(|_| ())
    }

    fn remove_empty_dir(&mut self, dir: &str) -> VfsResult<()> {
        self.run(&format!("rmdir {}", quote(&smb_path(dir)?)), dir)
            .map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LS_SAMPLE: &str = "  .                                   D        0  Mon Jan  1 12:00:00 2024
  ..                                  D        0  Mon Jan  1 12:00:00 2024
  Quarterly Report.xlsx               A    48213  Tue Feb 13 09:15:42 2024
  archive                             D        0  Wed Mar  6 18:01:00 2024
  notes.txt                                  17  Thu Mar  7 07:30:00 2024

\t\t61047 blocks of size 4096. 2045 blocks available
";

    #[test]
    fn test_parse_ls_output() {
        let entries = parse_ls_output(LS_SAMPLE, "projects");
        assert_eq!(entries.len(), 3);

        assert_eq!(entries[0].name, "Quarterly Report.xlsx");
        assert_eq!(entries[0].size, 48213);
        assert_eq!(entries[0].extension, "xlsx");
        assert_eq!(entries[0].full_path, "projects/Quarterly Report.xlsx");
        assert!(entries[0].modified > 0);

        assert!(entries[1].is_dir);
        assert_eq!(entries[1].name, "archive");

        assert_eq!(entries[2].name, "notes.txt");
        assert_eq!(entries[2].size, 17);
    }

    #[test]
    fn test_smb_path() {
        assert_eq!(smb_path("docs/a.txt").unwrap(), "\\docs\\a.txt");
        assert_eq!(smb_path("").unwrap(), "\\");
        assert!(smb_path("bad\"name").is_err());
    }

    #[test]
    fn test_map_nt_status() {
        let err = map_nt_status("NT_STATUS_OBJECT_NAME_NOT_FOUND listing \\x", "x").unwrap();
        assert!(matches!(err, VfsError::NotFound { .. }));

        let err = map_nt_status("session setup failed: NT_STATUS_LOGON_FAILURE", "x").unwrap();
        assert!(matches!(err, VfsError::Auth { .. }));

        assert!(map_nt_status("all good", "x").is_none());
    }
}
