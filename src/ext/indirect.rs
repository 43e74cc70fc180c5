use std::future::Future;
use std::pin::Pin;

use byteorder::{ByteOrder, LittleEndian};
use tokio::io::AsyncWrite;

use super::inode::InodeRecord;
use super::{fetch_block, FsError, BLOCK_SIZE, POINTERS_PER_BLOCK};
use crate::damage::DamageMap;
use crate::inspector::InspectorSession;

const DIRECT_POINTERS: usize = 12;

enum LevelOutcome {
    Unsafe,
    Consumed(u64),
}

/// Classic block-mapping resolution: twelve direct pointers, then the
/// single-, double- and triple-indirect trees, consulting only as many
/// entries as the record's block count still calls for. Indirect blocks are
/// fetched lazily and the walk short-circuits on the first unsafe pointer.
pub(crate) async fn tree_is_safe<W>(
    record: &InodeRecord,
    session: &InspectorSession<W>,
    damage: &DamageMap,
) -> Result<bool, FsError>
where
    W: AsyncWrite + Unpin,
{
    let map = record.block_map();
    let pointer = |i: usize| u64::from(LittleEndian::read_u32(&map[i * 4..i * 4 + 4]));

    let mut remaining = record.blocks_in_use();

    for i in 0..DIRECT_POINTERS {
        if remaining == 0 {
            return Ok(true);
        }
        let block = pointer(i);
        // A zero pointer is a hole: nothing allocated, nothing to count.
        if block == 0 {
            continue;
        }
        if damage.overlaps(block * BLOCK_SIZE, (block + 1) * BLOCK_SIZE) {
            return Ok(false);
        }
        remaining -= 1;
    }

    // Pointers 12..15 head trees one, two and three levels deep.
    for (depth, i) in (DIRECT_POINTERS..15).enumerate() {
        if remaining == 0 {
            break;
        }
        let block = pointer(i);
        if block == 0 {
            continue;
        }
        match level_is_safe(block, depth as u32 + 1, remaining, session, damage).await? {
            LevelOutcome::Unsafe => return Ok(false),
            LevelOutcome::Consumed(n) => remaining = remaining.saturating_sub(n),
        }
    }

    Ok(true)
}

fn level_is_safe<'a, W>(
    block: u64,
    level: u32,
    budget: u64,
    session: &'a InspectorSession<W>,
    damage: &'a DamageMap,
) -> Pin<Box<dyn Future<Output = Result<LevelOutcome, FsError>> + 'a>>
where
    W: AsyncWrite + Unpin,
{
    Box::pin(async move {
        let data = fetch_block(session, block).await?;
        let mut consumed = 0u64;

        for i in 0..POINTERS_PER_BLOCK {
            if consumed >= budget {
                break;
            }
            let pointer = u64::from(LittleEndian::read_u32(&data[i * 4..i * 4 + 4]));
            if pointer == 0 {
                continue;
            }
            if level == 1 {
                if damage.overlaps(pointer * BLOCK_SIZE, (pointer + 1) * BLOCK_SIZE) {
                    return Ok(LevelOutcome::Unsafe);
                }
                consumed += 1;
            } else {
                match level_is_safe(pointer, level - 1, budget - consumed, session, damage).await? {
                    LevelOutcome::Unsafe => return Ok(LevelOutcome::Unsafe),
                    LevelOutcome::Consumed(n) => consumed += n,
                }
            }
        }

        Ok(LevelOutcome::Consumed(consumed))
    })
}
