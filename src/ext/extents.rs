use std::future::Future;
use std::pin::Pin;

use byteorder::{ByteOrder, LittleEndian};
use tokio::io::AsyncWrite;

use super::inode::InodeRecord;
use super::{fetch_block, FsError, BLOCK_SIZE};
use crate::damage::DamageMap;
use crate::inspector::InspectorSession;

const EXTENT_MAGIC: u16 = 0xF30A;
const ENTRY_SIZE: usize = 12;

// On-disk format limit; also bounds recursion on hostile metadata.
const MAX_DEPTH: u16 = 5;

struct NodeHeader {
    entries: u16,
    depth: u16,
}

fn read_header(inode: u32, node: &[u8]) -> Result<NodeHeader, FsError> {
    if node.len() < ENTRY_SIZE {
        return Err(FsError::TruncatedRecord {
            inode,
            len: node.len(),
        });
    }
    let magic = LittleEndian::read_u16(&node[0..2]);
    if magic != EXTENT_MAGIC {
        return Err(FsError::BadExtentMagic { inode, magic });
    }
    Ok(NodeHeader {
        entries: LittleEndian::read_u16(&node[2..4]),
        depth: LittleEndian::read_u16(&node[6..8]),
    })
}

/// Walks the extent tree rooted in the record's 60-byte mapping area. Leaf
/// entries describe contiguous physical runs, which are tested against the
/// damage map; index entries name child blocks, fetched on demand. Unsafe
/// anywhere means unsafe overall, and the walk stops there.
pub(crate) async fn tree_is_safe<W>(
    record: &InodeRecord,
    session: &InspectorSession<W>,
    damage: &DamageMap,
) -> Result<bool, FsError>
where
    W: AsyncWrite + Unpin,
{
    node_is_safe(record.inode, record.block_map(), MAX_DEPTH, session, damage).await
}

fn node_is_safe<'a, W>(
    inode: u32,
    node: &'a [u8],
    depth_budget: u16,
    session: &'a InspectorSession<W>,
    damage: &'a DamageMap,
) -> Pin<Box<dyn Future<Output = Result<bool, FsError>> + 'a>>
where
    W: AsyncWrite + Unpin,
{
    Box::pin(async move {
        let header = read_header(inode, node)?;
        if header.depth > MAX_DEPTH || (header.depth > 0 && depth_budget == 0) {
            return Err(FsError::ExtentDepth { inode });
        }

        // The header claims an entry count; never trust it past what the
        // node actually holds.
        let capacity = (node.len() / ENTRY_SIZE).saturating_sub(1);
        let count = usize::from(header.entries).min(capacity);

        for i in 0..count {
            let entry = &node[(i + 1) * ENTRY_SIZE..(i + 2) * ENTRY_SIZE];
            if header.depth == 0 {
                // ee_len @4, ee_start_lo @8; the hi half is out of scope.
                let len = u64::from(LittleEndian::read_u16(&entry[4..6]));
                let first = u64::from(LittleEndian::read_u32(&entry[8..12]));
                if damage.overlaps(first * BLOCK_SIZE, (first + len) * BLOCK_SIZE) {
                    return Ok(false);
                }
            } else {
                // ei_leaf_lo @4.
                let child = u64::from(LittleEndian::read_u32(&entry[4..8]));
                let block = fetch_block(session, child).await?;
                if !node_is_safe(inode, &block, depth_budget - 1, session, damage).await? {
                    return Ok(false);
                }
            }
        }

        Ok(true)
    })
}
