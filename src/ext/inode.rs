use byteorder::{ByteOrder, LittleEndian};
use tokio::io::AsyncWrite;

use super::{extents, indirect, FsError, SECTORS_PER_BLOCK};
use crate::damage::DamageMap;
use crate::inspector::InspectorSession;

const S_IFMT: u16 = 0xF000;
const S_IFREG: u16 = 0x8000;
const S_IFDIR: u16 = 0x4000;

const EXT4_EXTENTS_FL: u32 = 0x0008_0000;

/// What a record describes, decided once at decode time. Everything that is
/// neither a regular file nor a directory (symlinks, devices, sockets) is
/// `Other` and carries no data this tool inspects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InodeKind {
    RegularFile,
    Directory,
    Other,
}

/// One decoded 256-byte on-disk inode record.
pub struct InodeRecord {
    pub inode: u32,
    kind: InodeKind,
    uses_extents: bool,
    blocks_in_use: u64,
    block_map: [u8; 60],
}

impl InodeRecord {
    pub fn decode(inode: u32, raw: &[u8]) -> Result<Self, FsError> {
        // i_mode..i_block span the first 100 bytes of the record.
        if raw.len() < 100 {
            return Err(FsError::TruncatedRecord {
                inode,
                len: raw.len(),
            });
        }

        let mode = LittleEndian::read_u16(&raw[0..2]);
        let sectors = u64::from(LittleEndian::read_u32(&raw[28..32]));
        let flags = LittleEndian::read_u32(&raw[32..36]);

        let mut block_map = [0u8; 60];
        block_map.copy_from_slice(&raw[40..100]);

        let kind = match mode & S_IFMT {
            S_IFREG => InodeKind::RegularFile,
            S_IFDIR => InodeKind::Directory,
            _ => InodeKind::Other,
        };

        Ok(Self {
            inode,
            kind,
            uses_extents: flags & EXT4_EXTENTS_FL != 0,
            // i_blocks counts 512-byte sectors.
            blocks_in_use: sectors.div_ceil(SECTORS_PER_BLOCK),
            block_map,
        })
    }

    #[inline]
    pub fn kind(&self) -> InodeKind {
        self.kind
    }

    #[inline]
    pub fn uses_extents(&self) -> bool {
        self.uses_extents
    }

    #[inline]
    pub fn blocks_in_use(&self) -> u64 {
        self.blocks_in_use
    }

    /// The 60-byte `i_block` mapping area: either the extent tree root or
    /// the fifteen classic block pointers.
    #[inline]
    pub fn block_map(&self) -> &[u8; 60] {
        &self.block_map
    }

    /// True iff none of this object's physical block ranges overlap the
    /// damage map. Child and indirect blocks are fetched lazily through the
    /// session, and resolution stops at the first unsafe range. Only
    /// meaningful for files and directories; callers do not invoke it for
    /// `Other` records.
    pub async fn data_is_safe<W>(
        &self,
        session: &InspectorSession<W>,
        damage: &DamageMap,
    ) -> Result<bool, FsError>
    where
        W: AsyncWrite + Unpin,
    {
        if self.uses_extents {
            extents::tree_is_safe(self, session, damage).await
        } else {
            indirect::tree_is_safe(self, session, damage).await
        }
    }
}
