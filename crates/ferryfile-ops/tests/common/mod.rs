//! In-memory provider used to exercise the VFS side of the engine.

#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use ferryfile_core::{FileEntry, VfsError, VfsResult};
use ferryfile_ops::{OverwriteDecision, OverwriteResponder, TransferEvent, TransferOutcome};
use ferryfile_vfs::tree::{self, TreeRemoval};
use ferryfile_vfs::{ProviderHandle, ProviderKind, VfsProvider, path};
use tokio::sync::mpsc;

#[derive(Default)]
pub struct MemoryFs {
    pub files: BTreeMap<String, Vec<u8>>,
    pub dirs: BTreeSet<String>,
    pub calls: Vec<String>,
    pub fail_delete: HashSet<String>,
}

/// A `/`-rooted tree held in memory. Clones share state, so a test keeps
/// one clone for inspection after handing another to the engine.
#[derive(Clone)]
pub struct MemoryProvider {
    state: Arc<Mutex<MemoryFs>>,
    native_rename: bool,
}

impl MemoryProvider {
    pub fn new() -> Self {
        let mut fs = MemoryFs::default();
        fs.dirs.insert("/".to_string());
        Self {
            state: Arc::new(Mutex::new(fs)),
            native_rename: false,
        }
    }

    pub fn with_rename(mut self) -> Self {
        self.native_rename = true;
        self
    }

    pub fn state(&self) -> MutexGuard<'_, MemoryFs> {
        self.state.lock().unwrap()
    }

    pub fn add_dir(&self, dir: &str) {
        let mut state = self.state();
        let mut current = dir.to_string();
        while current != "/" && !current.is_empty() {
            state.dirs.insert(current.clone());
            current = path::parent(&current);
        }
    }

    pub fn add_file(&self, file: &str, contents: &[u8]) {
        self.add_dir(&path::parent(file));
        self.state().files.insert(file.to_string(), contents.to_vec());
    }

    pub fn read(&self, file: &str) -> Option<Vec<u8>> {
        self.state().files.get(file).cloned()
    }

    pub fn exists(&self, p: &str) -> bool {
        let state = self.state();
        state.files.contains_key(p) || state.dirs.contains(p)
    }

    pub fn fail_delete_of(&self, p: &str) {
        self.state().fail_delete.insert(p.to_string());
    }

    pub fn calls(&self) -> Vec<String> {
        self.state().calls.clone()
    }

    pub fn handle(&self) -> ProviderHandle {
        ProviderHandle::new(self.clone())
    }

    fn record(&self, call: String) {
        self.state().calls.push(call);
    }
}

impl TreeRemoval for MemoryProvider {
    fn children(&mut self, dir: &str) -> VfsResult<Vec<FileEntry>> {
        self.list_directory(dir)
    }

    fn remove_file(&mut self, p: &str) -> VfsResult<()> {
        let mut state = self.state();
        if state.fail_delete.contains(p) {
            return Err(VfsError::permission_denied(p));
        }
        state.files.remove(p).ok_or_else(|| VfsError::not_found(p))?;
        state.calls.push(format!("rm {}", p));
        Ok(())
    }

    fn remove_empty_dir(&mut self, p: &str) -> VfsResult<()> {
        let mut state = self.state();
        if state.fail_delete.contains(p) {
            return Err(VfsError::permission_denied(p));
        }
        state.dirs.remove(p);
        state.calls.push(format!("rmdir {}", p));
        Ok(())
    }
}

impl VfsProvider for MemoryProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Sftp
    }

    fn display_name(&self) -> String {
        "mem://test".to_string()
    }

    fn list_directory(&mut self, dir: &str) -> VfsResult<Vec<FileEntry>> {
        let state = self.state();
        if !state.dirs.contains(dir) {
            return Err(VfsError::not_found(dir));
        }

        let mut children: Vec<(String, Option<u64>)> = state
            .dirs
            .iter()
            .filter(|d| d.as_str() != "/" && path::parent(d) == dir)
            .map(|d| (d.clone(), None))
            .chain(
                state
                    .files
                    .iter()
                    .filter(|(f, _)| path::parent(f) == dir)
                    .map(|(f, data)| (f.clone(), Some(data.len() as u64))),
            )
            .collect();
        children.sort();

        Ok(children
            .into_iter()
            .map(|(full, size)| {
                let name = path::basename(&full).to_string();
                match size {
                    Some(size) => FileEntry::file(name, full, size, 0),
                    None => FileEntry::directory(name, full, 0),
                }
            })
            .collect())
    }

    fn fetch_to_local(&mut self, remote_path: &str, local_dir: &Path) -> VfsResult<PathBuf> {
        let data = self
            .read(remote_path)
            .ok_or_else(|| VfsError::not_found(remote_path))?;
        let dest = local_dir.join(path::basename(remote_path));
        fs::write(&dest, data).map_err(|e| VfsError::io(&dest, e))?;
        self.record(format!("fetch {}", remote_path));
        Ok(dest)
    }

    fn push_from_local(&mut self, local_path: &Path, remote_dest: &str) -> VfsResult<()> {
        let data = fs::read(local_path).map_err(|e| VfsError::io(local_path, e))?;
        let mut state = self.state();
        if !state.dirs.contains(&path::parent(remote_dest)) {
            return Err(VfsError::not_found(remote_dest));
        }
        state.files.insert(remote_dest.to_string(), data);
        state.calls.push(format!("push {}", remote_dest));
        Ok(())
    }

    fn delete(&mut self, p: &str, is_directory: bool) -> VfsResult<()> {
        if is_directory {
            tree::remove_tree(self, p)
        } else {
            self.remove_file(p)
        }
    }

    fn make_directory(&mut self, dir: &str) -> VfsResult<()> {
        let mut state = self.state();
        if !state.dirs.contains(&path::parent(dir)) {
            return Err(VfsError::not_found(dir));
        }
        state.dirs.insert(dir.to_string());
        state.calls.push(format!("mkdir {}", dir));
        Ok(())
    }

    fn fetch_all(&mut self, dest_dir: &Path) -> VfsResult<()> {
        tree::mirror(self, "/", dest_dir)
    }

    fn close(&mut self) {}

    fn supports_rename(&self) -> bool {
        self.native_rename
    }

    fn rename(&mut self, from: &str, to: &str) -> VfsResult<()> {
        if !self.native_rename {
            return Err(VfsError::unsupported("Rename", self.display_name()));
        }
        let mut state = self.state();
        // Like SFTP and SMB servers, never replace an existing name.
        if state.files.contains_key(to) || state.dirs.contains(to) {
            return Err(VfsError::protocol(format!("rename target exists: {}", to)));
        }
        let data = state.files.remove(from).ok_or_else(|| VfsError::not_found(from))?;
        state.files.insert(to.to_string(), data);
        state.calls.push(format!("rename {} {}", from, to));
        Ok(())
    }
}

/// What a worker reported.
#[derive(Default)]
pub struct Run {
    pub percents: Vec<u8>,
    pub conflicts: usize,
    pub outcome: Option<TransferOutcome>,
    held: Vec<OverwriteResponder>,
}

impl Run {
    pub fn outcome(&self) -> &TransferOutcome {
        self.outcome.as_ref().expect("worker sent no Complete event")
    }
}

/// Drain a worker's events, answering every conflict with `decision`.
/// With no decision the queries are left pending.
pub async fn drain(mut events: mpsc::Receiver<TransferEvent>, decision: Option<OverwriteDecision>) -> Run {
    let mut run = Run::default();
    while let Some(event) = events.recv().await {
        match event {
            TransferEvent::Progress(progress) => run.percents.push(progress.percent),
            TransferEvent::Conflict(query) => {
                run.conflicts += 1;
                match decision {
                    Some(decision) => {
                        query.responder.respond(decision);
                    }
                    None => run.held.push(query.responder),
                }
            }
            TransferEvent::Complete(outcome) => {
                assert!(run.outcome.is_none(), "more than one Complete event");
                run.outcome = Some(outcome);
            }
        }
    }
    run
}
