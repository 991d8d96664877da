//! Append-only sets of message ids (sent, and optionally permanently failed).
//!
//! The on-disk format is one canonical URL per line. Files only ever grow; the
//! whole file is loaded into memory at startup.

use std::{
    collections::HashSet,
    fs::{self, OpenOptions},
    io::{ErrorKind, Write},
    path::PathBuf,
};

use crate::{domain::SentId, Result};

pub trait IdStore: Send {
    fn contains(&self, id: &SentId) -> bool;

    /// Persist `id` and add it to the in-memory set.
    fn append(&mut self, id: &SentId) -> Result<()>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Flat-file store. Missing files are a first run, not an error.
#[derive(Debug)]
pub struct FileIdStore {
    path: PathBuf,
    ids: HashSet<SentId>,
}

impl FileIdStore {
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let ids = match fs::read_to_string(&path) {
            Ok(contents) => parse_lines(&contents),
            Err(e) if e.kind() == ErrorKind::NotFound => HashSet::new(),
            Err(e) => return Err(e.into()),
        };
        Ok(Self { path, ids })
    }
}

impl IdStore for FileIdStore {
    fn contains(&self, id: &SentId) -> bool {
        self.ids.contains(id)
    }

    fn append(&mut self, id: &SentId) -> Result<()> {
        let mut f = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(f, "{id}")?;
        self.ids.insert(id.clone());
        Ok(())
    }

    fn len(&self) -> usize {
        self.ids.len()
    }
}

/// In-memory store; remembers what was appended, in order.
#[derive(Clone, Debug, Default)]
pub struct MemoryIdStore {
    ids: HashSet<SentId>,
    appended: Vec<SentId>,
}

impl MemoryIdStore {
    pub fn with_ids(ids: impl IntoIterator<Item = SentId>) -> Self {
        Self {
            ids: ids.into_iter().collect(),
            appended: Vec::new(),
        }
    }

    /// Ids appended during this process, in order.
    pub fn appended(&self) -> &[SentId] {
        &self.appended
    }
}

impl IdStore for MemoryIdStore {
    fn contains(&self, id: &SentId) -> bool {
        self.ids.contains(id)
    }

    fn append(&mut self, id: &SentId) -> Result<()> {
        self.ids.insert(id.clone());
        self.appended.push(id.clone());
        Ok(())
    }

    fn len(&self) -> usize {
        self.ids.len()
    }
}

fn parse_lines(contents: &str) -> HashSet<SentId> {
    contents
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(SentId::from_line)
        .collect()
}
