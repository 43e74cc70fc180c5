use thiserror::Error;
use tokio::io::AsyncWrite;

use crate::hexdump::decode_hexdump;
use crate::inspector::{InspectorError, InspectorSession};

pub mod extents;
pub mod indirect;
pub mod inode;
pub mod layout;

// Geometry of the target image. These match what mke2fs produces for the
// devices this tool is pointed at; the `stats` reply reports all three.
// TODO: parse block size, inode size and inodes-per-group out of the same
// `stats` reply FsLayout already reads, instead of fixing them here.
pub const BLOCK_SIZE: u64 = 4096;
pub const INODE_SIZE: u64 = 256;
pub const INODES_PER_GROUP: u64 = 8028;

pub(crate) const SECTORS_PER_BLOCK: u64 = BLOCK_SIZE / 512;
pub(crate) const POINTERS_PER_BLOCK: usize = (BLOCK_SIZE / 4) as usize;

#[derive(Error, Debug)]
pub enum FsError {
    #[error("Block group {group} is missing from the inode table map (inode {inode})")]
    MissingGroup { group: u32, inode: u32 },

    #[error("Inode number 0 is not addressable")]
    InvalidInode,

    #[error("`stats` reply lacks the filesystem features banner")]
    MissingBanner,

    #[error("Inode record for {inode} is truncated ({len} bytes)")]
    TruncatedRecord { inode: u32, len: usize },

    #[error("Inode {inode}: extent node magic {magic:#06x}")]
    BadExtentMagic { inode: u32, magic: u16 },

    #[error("Inode {inode}: extent tree deeper than the on-disk format allows")]
    ExtentDepth { inode: u32 },

    #[error(transparent)]
    Inspector(#[from] InspectorError),
}

/// Fetches one filesystem block through the inspector.
pub(crate) async fn fetch_block<W>(
    session: &InspectorSession<W>,
    block: u64,
) -> Result<Vec<u8>, FsError>
where
    W: AsyncWrite + Unpin,
{
    let reply = session.run(&format!("block_dump {block}")).await?;
    Ok(decode_hexdump(&reply, BLOCK_SIZE as usize))
}
