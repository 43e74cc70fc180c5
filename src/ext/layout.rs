use std::collections::HashMap;

use tokio::io::AsyncWrite;

use super::{FsError, BLOCK_SIZE, INODES_PER_GROUP, INODE_SIZE};
use crate::inspector::InspectorSession;

/// Maps block groups to the byte offset of their inode tables, parsed once
/// from the inspector's `stats` reply.
pub struct FsLayout {
    table_offsets: HashMap<u32, u64>,
}

impl FsLayout {
    pub async fn load<W>(session: &InspectorSession<W>) -> Result<Self, FsError>
    where
        W: AsyncWrite + Unpin,
    {
        let reply = session.run("stats").await?;
        Self::parse(&reply)
    }

    /// Parses `stats` output. The features banner doubles as a sanity check
    /// that we are talking to the right tool about the right device.
    pub fn parse(stats: &str) -> Result<Self, FsError> {
        if !stats.contains("Filesystem features:") {
            return Err(FsError::MissingBanner);
        }

        let mut table_offsets = HashMap::new();
        for line in stats.lines() {
            // " Group  0: block bitmap at 193, inode bitmap at 209, inode table at 225"
            let Some(rest) = line.trim_start().strip_prefix("Group") else {
                continue;
            };
            let Some((number, tail)) = rest.split_once(':') else {
                continue;
            };
            let Ok(group) = number.trim().parse::<u32>() else {
                continue;
            };
            let Some(pos) = tail.find("inode table at ") else {
                continue;
            };
            let digits: String = tail[pos + "inode table at ".len()..]
                .chars()
                .take_while(|c| c.is_ascii_digit())
                .collect();
            let Ok(block) = digits.parse::<u64>() else {
                continue;
            };
            table_offsets.insert(group, block * BLOCK_SIZE);
        }

        Ok(Self { table_offsets })
    }

    /// Byte address of the record for `inode` (1-based).
    pub fn inode_address(&self, inode: u32) -> Result<u64, FsError> {
        let index = u64::from(inode.checked_sub(1).ok_or(FsError::InvalidInode)?);
        let group = (index / INODES_PER_GROUP) as u32;
        let slot = index % INODES_PER_GROUP;
        let base = self
            .table_offsets
            .get(&group)
            .ok_or(FsError::MissingGroup { group, inode })?;
        Ok(base + slot * INODE_SIZE)
    }

    pub fn group_count(&self) -> usize {
        self.table_offsets.len()
    }
}
