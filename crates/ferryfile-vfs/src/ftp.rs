//! FTP provider built on suppaftp.

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{Datelike, NaiveDate, NaiveDateTime, Utc};
use ferryfile_core::{FileEntry, VfsError, VfsResult};
use suppaftp::types::{FileType, Mode};
use suppaftp::{FtpError, FtpStream};
use tracing::{debug, info, warn};

use crate::path;
use crate::provider::{ProviderKind, VfsProvider};
use crate::tree::{self, TreeRemoval};

/// Connection parameters for an FTP server.
#[derive(Debug, Clone)]
pub struct FtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub passive: bool,
}

impl FtpConfig {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: 21,
            username: "anonymous".to_string(),
            password: "anonymous@".to_string(),
            passive: true,
        }
    }

    pub fn with_credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = username.into();
        self.password = password.into();
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }
}

/// FTP backend. Connects on first use and reconnects when `NOOP` fails.
pub struct FtpProvider {
    config: FtpConfig,
    stream: Option<FtpStream>,
    location: String,
    mlsd_supported: bool,
}

impl FtpProvider {
    pub fn new(config: FtpConfig) -> Self {
        Self {
            config,
            stream: None,
            location: "/".to_string(),
            mlsd_supported: true,
        }
    }

    fn connect(&self) -> VfsResult<FtpStream> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let mut ftp = FtpStream::connect(&addr).map_err(map_ftp_error)?;

        if self.config.passive {
            ftp.set_mode(Mode::Passive);
        }

        ftp.login(&self.config.username, &self.config.password)
            .map_err(map_ftp_error)?;
        ftp.transfer_type(FileType::Binary).map_err(map_ftp_error)?;

        info!(host = %self.config.host, "FTP connected");
        Ok(ftp)
    }

    /// Live stream, reconnecting if the previous one went stale.
    fn stream(&mut self) -> VfsResult<&mut FtpStream> {
        let alive = match self.stream.as_mut() {
            Some(ftp) => ftp.noop().is_ok(),
            None => false,
        };

        if !alive {
            if self.stream.take().is_some() {
                warn!(host = %self.config.host, "FTP connection lost, reconnecting");
            }
            self.stream = Some(self.connect()?);
        }

        self.stream
            .as_mut()
            .ok_or_else(|| VfsError::connection("FTP connection closed"))
    }

    fn list_with_fallback(&mut self, dir: &str) -> VfsResult<Vec<FileEntry>> {
        if self.mlsd_supported {
            match self.stream()?.mlsd(Some(dir)) {
                Ok(lines) => {
                    return Ok(lines
                        .iter()
                        .filter_map(|line| parse_mlsd_line(line, dir))
                        .collect());
                }
                Err(FtpError::UnexpectedResponse(resp)) if resp.status.code() == 500 || resp.status.code() == 502 => {
                    debug!("server does not support MLSD, using LIST");
                    self.mlsd_supported = false;
                }
                Err(e) => return Err(map_ftp_error(e)),
            }
        }

        let lines = self.stream()?.list(Some(dir)).map_err(map_ftp_error)?;
        Ok(lines
            .iter()
            .filter_map(|line| parse_list_line(line, dir))
            .collect())
    }
}

impl VfsProvider for FtpProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Ftp
    }

    fn display_name(&self) -> String {
        if self.config.port != 21 {
            format!("ftp://{}@{}:{}", self.config.username, self.config.host, self.config.port)
        } else {
            format!("ftp://{}@{}", self.config.username, self.config.host)
        }
    }

    fn list_directory(&mut self, dir: &str) -> VfsResult<Vec<FileEntry>> {
        let dir = if dir.is_empty() { "/" } else { dir };
        let listing = self.list_with_fallback(dir)?;
        self.location = dir.to_string();
        Ok(listing)
    }

    fn fetch_to_local(&mut self, remote_path: &str, local_dir: &Path) -> VfsResult<PathBuf> {
        let name = tree::safe_name(path::basename(remote_path))?;
        let dest = local_dir.join(name);

        let buffer = self.stream()?.retr_as_buffer(remote_path).map_err(map_ftp_error)?;
        let mut file = File::create(&dest).map_err(|e| VfsError::io(&dest, e))?;
        file.write_all(buffer.get_ref())
            .map_err(|e| VfsError::io(&dest, e))?;

        debug!(remote_path, local = %dest.display(), "FTP download complete");
        Ok(dest)
    }

    fn push_from_local(&mut self, local_path: &Path, remote_dest: &str) -> VfsResult<()> {
        let mut file = File::open(local_path).map_err(|e| VfsError::io(local_path, e))?;
        self.stream()?
            .put_file(remote_dest, &mut file)
            .map_err(map_ftp_error)?;
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
        self.stream()?.mkdir(dir).map_err(map_ftp_error)
    }

    fn fetch_all(&mut self, dest_dir: &Path) -> VfsResult<()> {
        let location = self.location.clone();
        tree::mirror(self, &location, dest_dir)
    }

    fn close(&mut self) {
        if let Some(mut ftp) = self.stream.take() {
            let _ = ftp.quit();
        }
    }

    fn supports_rename(&self) -> bool {
        true
    }

    fn rename(&mut self, from: &str, to: &str) -> VfsResult<()> {
        self.stream()?.rename(from, to).map_err(map_ftp_error)
    }
}

impl TreeRemoval for FtpProvider {
    fn children(&mut self, dir: &str) -> VfsResult<Vec<FileEntry>> {
        self.list_with_fallback(dir)
    }

    fn remove_file(&mut self, target: &str) -> VfsResult<()> {
        self.stream()?.rm(target).map_err(map_ftp_error)
    }

    fn remove_empty_dir(&mut self, dir: &str) -> VfsResult<()> {
        self.stream()?.rmdir(dir).map_err(map_ftp_error)
    }
}

impl Drop for FtpProvider {
    fn drop(&mut self) {
        self.close();
    }
}

/// Convert a suppaftp error into the provider error taxonomy.
fn map_ftp_error(e: FtpError) -> VfsError {
    match &e {
        FtpError::ConnectionError(err) => VfsError::connection(err.to_string()),
        FtpError::SecureError(msg) => VfsError::connection(format!("TLS error: {}", msg)),
        FtpError::UnexpectedResponse(resp) => {
            let code = resp.status.code();
            let body = String::from_utf8_lossy(&resp.body).trim().to_string();
            match code {
                530 => VfsError::Auth {
                    message: "Login incorrect".to_string(),
                },
                550 => VfsError::not_found(body),
                553 | 451 => VfsError::permission_denied(body),
                421 => VfsError::connection(body),
                _ => VfsError::protocol(format!("FTP error {}: {}", code, body)),
            }
        }
        _ => VfsError::other(e.to_string()),
    }
}

/// Parse one `MLSD` line such as `type=file;size=12;modify=20240101120000; a.txt`.
pub fn parse_mlsd_line(line: &str, base: &str) -> Option<FileEntry> {
    let (facts, name) = line.split_once(' ')?;
    let name = name.trim_end_matches(['\r', '\n']);
    if name.is_empty() {
        return None;
    }

    let mut kind = "";
    let mut size = 0u64;
    let mut modified = 0i64;
    let mut perm = None;

    for fact in facts.split(';').filter(|f| !f.is_empty()) {
        let Some((key, value)) = fact.split_once('=') else {
            continue;
        };
        match key.to_ascii_lowercase().as_str() {
            "type" => kind = value,
            "size" => size = value.parse().unwrap_or(0),
            "modify" => modified = parse_mlsd_time(value).unwrap_or(0),
            "unix.mode" => {
                perm = u32::from_str_radix(value, 8)
                    .ok()
                    .map(ferryfile_core::permissions_text)
            }
            _ => {}
        }
    }

    let full_path = path::join(base, name);
    let entry = match kind.to_ascii_lowercase().as_str() {
        "cdir" | "pdir" => return None,
        "dir" => FileEntry::directory(name, full_path, modified),
        _ => FileEntry::file(name, full_path, size, modified),
    };
    Some(entry.with_posix(None, None, perm))
}

fn parse_mlsd_time(value: &str) -> Option<i64> {
    let digits = value.get(..14)?;
    NaiveDateTime::parse_from_str(digits, "%Y%m%d%H%M%S")
        .ok()
        .map(|dt| dt.and_utc().timestamp())
}

/// Parse one Unix-style `LIST` line such as
/// `drwxr-xr-x 2 ftp ftp 4096 Jan 15 10:30 docs`.
pub fn parse_list_line(line: &str, base: &str) -> Option<FileEntry> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    if parts.len() < 9 {
        return None;
    }

    let perms = parts[0];
    let is_dir = perms.starts_with('d');
    let mut name = parts[8..].join(" ");
    if perms.starts_with('l') {
        if let Some(idx) = name.find(" -> ") {
            name.truncate(idx);
        }
    }
    if name == "." || name == ".." {
        return None;
    }

    let modified = parse_list_date(parts[5], parts[6], parts[7]).unwrap_or(0);
    let full_path = path::join(base, &name);
    let permissions = perms.get(1..).map(str::to_string);

    let entry = if is_dir {
        FileEntry::directory(name, full_path, modified)
    } else {
        let size = parts[4].parse().unwrap_or(0);
        FileEntry::file(name, full_path, size, modified)
    };

    Some(entry.with_posix(
        Some(parts[2].to_string()),
        Some(parts[3].to_string()),
        permissions,
    ))
}

/// `Jan 15 10:30` (current year) or `Jan 15 2023`.
fn parse_list_date(month: &str, day: &str, time_or_year: &str) -> Option<i64> {
    let (year, time) = if time_or_year.contains(':') {
        (Utc::now().year(), time_or_year)
    } else {
        (time_or_year.parse().ok()?, "00:00")
    };
    let date = NaiveDate::parse_from_str(&format!("{} {} {}", month, day, year), "%b %d %Y").ok()?;
    let time = chrono::NaiveTime::parse_from_str(time, "%H:%M").ok()?;
    Some(date.and_time(time).and_utc().timestamp())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_mlsd_file() {
        let entry =
            parse_mlsd_line("type=file;size=1234;modify=20240102030405;unix.mode=0644; report.pdf", "/pub")
                .unwrap();
        assert_eq!(entry.name, "report.pdf");
        assert_eq!(entry.full_path, "/pub/report.pdf");
        assert_eq!(entry.size, 1234);
        assert_eq!(entry.modified, 1_704_164_645);
        assert_eq!(entry.permissions.as_deref(), Some("rw-r--r--"));
        assert!(!entry.is_dir);
    }

    #[test]
    fn test_parse_mlsd_skips_cdir() {
        assert!(parse_mlsd_line("type=cdir;modify=20240101000000; .", "/").is_none());
        assert!(parse_mlsd_line("type=pdir;modify=20240101000000; ..", "/").is_none());
        let dir = parse_mlsd_line("type=dir;modify=20240101000000; my docs", "/").unwrap();
        assert!(dir.is_dir);
        assert_eq!(dir.name, "my docs");
        assert_eq!(dir.full_path, "/my docs");
    }

    #[test]
    fn test_parse_list_line() {
        let entry =
            parse_list_line("-rw-r--r--   1 alice staff   2048 Mar  3  2021 notes final.txt", "/home")
                .unwrap();
        assert_eq!(entry.name, "notes final.txt");
        assert_eq!(entry.size, 2048);
        assert_eq!(entry.owner.as_deref(), Some("alice"));
        assert_eq!(entry.permissions.as_deref(), Some("rw-r--r--"));
        assert_eq!(entry.modified, 1_614_729_600);

        let link = parse_list_line("lrwxrwxrwx 1 root root 7 Jan 15 10:30 latest -> v2", "/").unwrap();
        assert_eq!(link.name, "latest");

        assert!(parse_list_line("drwxr-xr-x 2 ftp ftp 4096 Jan 15 10:30 ..", "/").is_none());
        assert!(parse_list_line("total 12", "/").is_none());
    }
}
