// src/fs/mock.rs

use super::FileSystem;
use anyhow::{anyhow, Result};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

/// Where an injected failure strikes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailPoint {
    /// `write` stores the first half of the bytes, then errors.
    Write,
    /// `rename` errors and leaves both files as they were.
    Rename,
}

#[derive(Debug, Default)]
struct MockState {
    files: HashMap<PathBuf, Vec<u8>>,
    dirs: HashSet<PathBuf>,
    /// Next failure to inject, with the number of successful calls to let
    /// through first.
    fail: Option<(FailPoint, usize)>,
    writes: usize,
}

/// In-memory filesystem for tests, with crash injection.
#[derive(Debug, Clone, Default)]
pub struct MockFileSystem {
    state: Arc<Mutex<MockState>>,
}

impl MockFileSystem {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, MockState>> {
        self.state.lock().map_err(|_| anyhow!("mock filesystem lock poisoned"))
    }

    pub fn add_file(&self, path: impl AsRef<Path>, content: impl Into<Vec<u8>>) {
        if let Ok(mut state) = self.lock() {
            state.files.insert(path.as_ref().to_path_buf(), content.into());
        }
    }

    pub fn contents(&self, path: impl AsRef<Path>) -> Option<Vec<u8>> {
        self.lock().ok()?.files.get(path.as_ref()).cloned()
    }

    /// Fail at `point` after letting `skip` matching calls succeed.
    pub fn fail_after(&self, point: FailPoint, skip: usize) {
        if let Ok(mut state) = self.lock() {
            state.fail = Some((point, skip));
        }
    }

    /// Number of successful `write` calls so far.
    pub fn write_count(&self) -> usize {
        self.lock().map(|s| s.writes).unwrap_or(0)
    }

    fn should_fail(state: &mut MockState, point: FailPoint) -> bool {
        match state.fail {
            Some((p, skip)) if p == point => {
                if skip == 0 {
                    state.fail = None;
                    true
                } else {
                    state.fail = Some((p, skip - 1));
                    false
                }
            }
            _ => false,
        }
    }
}

impl FileSystem for MockFileSystem {
    fn read_to_string(&self, path: &Path) -> Result<String> {
        let state = self.lock()?;
        match state.files.get(path) {
            Some(content) => {
                String::from_utf8(content.clone()).map_err(|e| anyhow!("Invalid UTF-8: {}", e))
            }
            None => Err(anyhow!("File not found: {:?}", path)),
        }
    }

    fn write(&self, path: &Path, contents: &[u8]) -> Result<()> {
        let mut state = self.lock()?;
        if Self::should_fail(&mut state, FailPoint::Write) {
            let torn = contents[..contents.len() / 2].to_vec();
            state.files.insert(path.to_path_buf(), torn);
            return Err(anyhow!("injected write failure: {:?}", path));
        }
        state.files.insert(path.to_path_buf(), contents.to_vec());
        state.writes += 1;
        Ok(())
    }

    fn rename(&self, from: &Path, to: &Path) -> Result<()> {
        let mut state = self.lock()?;
        if Self::should_fail(&mut state, FailPoint::Rename) {
            return Err(anyhow!("injected rename failure: {:?} -> {:?}", from, to));
        }
        let content = state
            .files
            .remove(from)
            .ok_or_else(|| anyhow!("File not found: {:?}", from))?;
        state.files.insert(to.to_path_buf(), content);
        Ok(())
    }

    fn remove_file(&self, path: &Path) -> Result<()> {
        let mut state = self.lock()?;
        state
            .files
            .remove(path)
            .map(|_| ())
            .ok_or_else(|| anyhow!("File not found: {:?}", path))
    }

    fn exists(&self, path: &Path) -> bool {
        self.lock()
            .map(|s| s.files.contains_key(path) || s.dirs.contains(path))
            .unwrap_or(false)
    }

    fn create_dir_all(&self, path: &Path) -> Result<()> {
        let mut state = self.lock()?;
        state.dirs.insert(path.to_path_buf());
        Ok(())
    }
}
