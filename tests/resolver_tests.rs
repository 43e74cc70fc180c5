use badmap::ext::FsError;
use badmap::{BadRange, DamageMap, InodeRecord};

mod common;

use common::{EXTENTS_FL, FILE_MODE};

fn extent_file(map: [u8; 60]) -> InodeRecord {
    InodeRecord::decode(12, &common::inode_bytes(FILE_MODE, 0, EXTENTS_FL, &map)).unwrap()
}

fn classic_file(blocks: u64, map: [u8; 60]) -> InodeRecord {
    let sectors = (blocks * 8) as u32;
    InodeRecord::decode(12, &common::inode_bytes(FILE_MODE, sectors, 0, &map)).unwrap()
}

#[tokio::test]
async fn test_extent_leaf_run_boundaries() {
    let record = extent_file(common::extent_root_leaf(&[(10, 2)]));

    // Blocks 10..12 span bytes 40960..49152.
    let hit = DamageMap::new(vec![BadRange::new(40960, 8192)]);
    let after = DamageMap::new(vec![BadRange::new(49152, 4096)]);
    let before = DamageMap::new(vec![BadRange::new(36864, 4096)]);

    let (session, log) = common::scripted_session(vec![]).await;
    assert!(!record.data_is_safe(&session, &hit).await.unwrap());
    assert!(record.data_is_safe(&session, &after).await.unwrap());
    assert!(record.data_is_safe(&session, &before).await.unwrap());

    // A depth-0 root resolves without a single block fetch.
    assert!(common::commands(&log).is_empty());
}

#[tokio::test]
async fn test_extent_tree_descends_and_short_circuits() {
    let record = extent_file(common::extent_root_index(&[777, 778]));
    let damage = DamageMap::new(vec![BadRange::new(10 * 4096, 4096)]);

    let (session, log) = common::scripted_session(vec![
        (
            "block_dump 777".to_string(),
            common::hexdump(&common::extent_block_leaf(&[(10, 2)])),
        ),
        (
            "block_dump 778".to_string(),
            common::hexdump(&common::extent_block_leaf(&[(900, 1)])),
        ),
    ])
    .await;

    assert!(!record.data_is_safe(&session, &damage).await.unwrap());

    // The first child already proved the file unsafe; the second child is
    // never fetched.
    assert_eq!(common::commands(&log), vec!["block_dump 777"]);
}

#[tokio::test]
async fn test_extent_bad_magic_is_corrupt_metadata() {
    let record = extent_file([0u8; 60]);
    let damage = DamageMap::new(vec![]);

    let (session, _log) = common::scripted_session(vec![]).await;
    assert!(matches!(
        record.data_is_safe(&session, &damage).await,
        Err(FsError::BadExtentMagic { inode: 12, magic: 0 })
    ));
}

#[tokio::test]
async fn test_extent_self_referencing_tree_is_bounded() {
    // A hostile index node that points back at its own block would recurse
    // forever without the depth budget.
    let record = extent_file(common::extent_root_index(&[777]));
    let damage = DamageMap::new(vec![]);

    let mut cyclic = vec![0u8; 4096];
    cyclic[..60].copy_from_slice(&common::extent_root_index(&[777]));

    let (session, _log) = common::scripted_session(vec![(
        "block_dump 777".to_string(),
        common::hexdump(&cyclic),
    )])
    .await;

    assert!(matches!(
        record.data_is_safe(&session, &damage).await,
        Err(FsError::ExtentDepth { inode: 12 })
    ));
}

#[tokio::test]
async fn test_indirect_thirteen_blocks_stop_at_single_level() {
    let direct: Vec<u32> = (100..112).collect();
    let record = classic_file(13, common::classic_block_map(&direct, 200, 300, 400));

    // Pointer 113 sits past the one block the record still needs; damage on
    // it must be invisible because that entry is never consulted.
    let damage = DamageMap::new(vec![BadRange::new(113 * 4096, 4096)]);

    let (session, log) = common::scripted_session(vec![(
        "block_dump 200".to_string(),
        common::hexdump(&common::pointer_block(&[112, 113, 114])),
    )])
    .await;

    assert!(record.data_is_safe(&session, &damage).await.unwrap());
    assert_eq!(common::commands(&log), vec!["block_dump 200"]);
}

#[tokio::test]
async fn test_indirect_unsafe_direct_pointer_skips_all_fetches() {
    let direct: Vec<u32> = (100..112).collect();
    let record = classic_file(13, common::classic_block_map(&direct, 200, 300, 400));
    let damage = DamageMap::new(vec![BadRange::new(100 * 4096, 4096)]);

    let (session, log) = common::scripted_session(vec![]).await;
    assert!(!record.data_is_safe(&session, &damage).await.unwrap());
    assert!(common::commands(&log).is_empty());
}

#[tokio::test]
async fn test_indirect_unsafe_pointer_inside_single_level() {
    let direct: Vec<u32> = (100..112).collect();
    let record = classic_file(13, common::classic_block_map(&direct, 200, 0, 0));
    let damage = DamageMap::new(vec![BadRange::new(112 * 4096, 4096)]);

    let (session, _log) = common::scripted_session(vec![(
        "block_dump 200".to_string(),
        common::hexdump(&common::pointer_block(&[112])),
    )])
    .await;

    assert!(!record.data_is_safe(&session, &damage).await.unwrap());
}

#[tokio::test]
async fn test_indirect_double_level_descends_once_needed() {
    // 12 direct + 1024 single-indirect + 1 double-indirect block.
    let direct: Vec<u32> = (100..112).collect();
    let record = classic_file(1037, common::classic_block_map(&direct, 200, 300, 0));
    let damage = DamageMap::new(vec![]);

    let single: Vec<u32> = (2000..3024).collect();
    let (session, log) = common::scripted_session(vec![
        (
            "block_dump 200".to_string(),
            common::hexdump(&common::pointer_block(&single)),
        ),
        (
            "block_dump 300".to_string(),
            common::hexdump(&common::pointer_block(&[600])),
        ),
        (
            "block_dump 600".to_string(),
            common::hexdump(&common::pointer_block(&[700, 701])),
        ),
    ])
    .await;

    assert!(record.data_is_safe(&session, &damage).await.unwrap());
    assert_eq!(
        common::commands(&log),
        vec!["block_dump 200", "block_dump 300", "block_dump 600"]
    );
}

#[tokio::test]
async fn test_indirect_holes_are_skipped() {
    // Sparse file: two real blocks separated by holes.
    let record = classic_file(2, common::classic_block_map(&[0, 100, 0, 101], 0, 0, 0));
    let damage = DamageMap::new(vec![BadRange::new(0, 4096)]);

    let (session, log) = common::scripted_session(vec![]).await;
    assert!(record.data_is_safe(&session, &damage).await.unwrap());
    assert!(common::commands(&log).is_empty());
}
