use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;

use thiserror::Error;
use tokio::io::AsyncWrite;
use tracing::{debug, trace};

use crate::damage::DamageMap;
use crate::ext::inode::{InodeKind, InodeRecord};
use crate::ext::layout::FsLayout;
use crate::ext::{FsError, INODE_SIZE};
use crate::hexdump::decode_hexdump;
use crate::inspector::{InspectorError, InspectorSession};
use crate::report::{Finding, ReportSink};

pub const ROOT_INODE: u32 = 2;

// Deeper nesting than this on real media means the directory metadata is
// lying to us.
const MAX_WALK_DEPTH: usize = 64;

#[derive(Error, Debug)]
pub enum WalkError {
    #[error(transparent)]
    Inspector(#[from] InspectorError),

    #[error(transparent)]
    Fs(#[from] FsError),

    #[error("Directory nesting exceeds {MAX_WALK_DEPTH} levels at {path}")]
    DepthExceeded { path: String },
}

#[derive(Debug, Default, Clone, Copy)]
pub struct WalkStats {
    pub directories: u64,
    pub files: u64,
    pub findings: u64,
}

/// One directory entry as the inspector lists it; `.` and `..` are dropped
/// at parse time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub inode: u32,
    pub name: String,
}

/// Recursive directory visitor. Per directory: verify the directory's own
/// data, list it, screen each entry's inode record address against the
/// damage map, fetch the surviving records as one pipelined batch, then test
/// files and descend into unvisited directories. A shared visited set keeps
/// hard-linked inodes from being processed twice.
pub struct Walker<'a, W, S> {
    session: &'a InspectorSession<W>,
    layout: &'a FsLayout,
    damage: &'a DamageMap,
    sink: &'a mut S,
    visited: HashSet<u32>,
    stats: WalkStats,
}

impl<'a, W, S> Walker<'a, W, S>
where
    W: AsyncWrite + Unpin,
    S: ReportSink,
{
    pub fn new(
        session: &'a InspectorSession<W>,
        layout: &'a FsLayout,
        damage: &'a DamageMap,
        sink: &'a mut S,
    ) -> Self {
        Self {
            session,
            layout,
            damage,
            sink,
            visited: HashSet::new(),
            stats: WalkStats::default(),
        }
    }

    /// Walks the whole tree from the root inode and returns run counters.
    pub async fn run(mut self) -> Result<WalkStats, WalkError> {
        // The root has no parent listing to screen its record address, so
        // screen it here before trusting the decoded record.
        let address = self.layout.inode_address(ROOT_INODE)?;
        if self.damage.overlaps(address, address + INODE_SIZE) {
            self.emit(Finding::inode_record("/"));
            return Ok(self.stats);
        }

        let record = self.fetch_record(ROOT_INODE).await?;
        self.visited.insert(ROOT_INODE);
        self.visit_dir(record, String::from("/"), 0).await?;
        Ok(self.stats)
    }

    async fn fetch_record(&self, inode: u32) -> Result<InodeRecord, WalkError> {
        let reply = self.session.run(&format!("inode_dump <{inode}>")).await?;
        let raw = decode_hexdump(&reply, INODE_SIZE as usize);
        Ok(InodeRecord::decode(inode, &raw)?)
    }

    fn emit(&mut self, finding: Finding) {
        self.stats.findings += 1;
        self.sink.report(finding);
    }

    fn visit_dir<'s>(
        &'s mut self,
        record: InodeRecord,
        path: String,
        depth: usize,
    ) -> Pin<Box<dyn Future<Output = Result<(), WalkError>> + 's>> {
        Box::pin(async move {
            if depth > MAX_WALK_DEPTH {
                return Err(WalkError::DepthExceeded { path });
            }

            // A directory whose own blocks are damaged has an untrustworthy
            // listing; report it and stop here.
            if !record.data_is_safe(self.session, self.damage).await? {
                self.emit(Finding::directory_data(path.as_str()));
                return Ok(());
            }

            self.stats.directories += 1;
            trace!(%path, inode = record.inode, "descending");

            let listing = self.session.run(&format!("ls -p <{}>", record.inode)).await?;
            let entries = parse_listing(&listing);

            // Screen each entry's own record address first: a damaged record
            // cannot even tell us what the entry is.
            let mut survivors = Vec::with_capacity(entries.len());
            for entry in entries {
                let address = self.layout.inode_address(entry.inode)?;
                if self.damage.overlaps(address, address + INODE_SIZE) {
                    self.emit(Finding::inode_record(join_path(&path, &entry.name)));
                } else {
                    survivors.push(entry);
                }
            }

            // Pipeline the sibling record fetches: every command is written
            // before any reply is awaited, and FIFO resolution pairs them.
            let mut pending = Vec::with_capacity(survivors.len());
            for entry in &survivors {
                pending.push(
                    self.session
                        .submit(&format!("inode_dump <{}>", entry.inode))
                        .await?,
                );
            }

            let mut records = Vec::with_capacity(survivors.len());
            for (entry, reply) in survivors.iter().zip(pending) {
                let text = self.session.resolve(reply).await?;
                let raw = decode_hexdump(&text, INODE_SIZE as usize);
                records.push(InodeRecord::decode(entry.inode, &raw)?);
            }

            for (entry, child) in survivors.into_iter().zip(records) {
                if !self.visited.insert(entry.inode) {
                    debug!(inode = entry.inode, name = %entry.name, "already visited");
                    continue;
                }
                let child_path = join_path(&path, &entry.name);
                match child.kind() {
                    InodeKind::RegularFile => {
                        self.stats.files += 1;
                        if !child.data_is_safe(self.session, self.damage).await? {
                            self.emit(Finding::file_data(child_path));
                        }
                    }
                    InodeKind::Directory => {
                        self.visit_dir(child, child_path, depth + 1).await?;
                    }
                    InodeKind::Other => {}
                }
            }

            Ok(())
        })
    }
}

fn join_path(parent: &str, name: &str) -> String {
    if parent == "/" {
        format!("/{name}")
    } else {
        format!("{parent}/{name}")
    }
}

/// Parses `ls -p` output lines of the form `/<ino>/<mode>/<uid>/<gid>/<name>/...`;
/// only the inode number and name matter. Non-matching lines and deleted
/// (inode 0) entries are skipped.
pub fn parse_listing(text: &str) -> Vec<DirEntry> {
    let mut entries = Vec::new();
    for line in text.lines() {
        let line = line.trim();
        if !line.starts_with('/') {
            continue;
        }
        let fields: Vec<&str> = line.split('/').collect();
        if fields.len() < 6 {
            continue;
        }
        let Ok(inode) = fields[1].parse::<u32>() else {
            continue;
        };
        if inode == 0 {
            continue;
        }
        let name = fields[5];
        if name.is_empty() || name == "." || name == ".." {
            continue;
        }
        entries.push(DirEntry {
            inode,
            name: name.to_string(),
        });
    }
    entries
}
