//! Virtual file system providers for ferryfile.
//!
//! Every backend implements [`VfsProvider`] with blocking, single-object
//! primitives. Recursion lives in [`tree`], and [`ProviderHandle`] moves a
//! provider between its owner and the transfer engine's blocking threads.

pub mod archive;
pub mod drive;
pub mod ftp;
pub mod local;
pub mod path;
pub mod profile;
mod provider;
pub mod search;
pub mod sftp;
pub mod smb;
pub mod tree;

pub use archive::{ArchiveFormat, ArchiveProvider, is_archive};
pub use drive::{DriveConfig, DriveProvider};
pub use ftp::{FtpConfig, FtpProvider};
pub use local::LocalProvider;
pub use profile::{ConnectionProfile, ProfileStore, Protocol};
pub use provider::{ProviderHandle, ProviderKind, VfsProvider};
pub use search::SearchResultsProvider;
pub use sftp::{SftpAuth, SftpConfig, SftpProvider};
pub use smb::{SmbConfig, SmbProvider};

pub use ferryfile_core::{FileEntry, VfsError, VfsResult};
