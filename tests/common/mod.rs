#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use badmap::{InspectorSession, PROMPT};
use tokio::io::{duplex, AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream};

pub type CommandLog = Arc<Mutex<Vec<String>>>;

pub const FILE_MODE: u16 = 0o100644;
pub const DIR_MODE: u16 = 0o040755;
pub const SYMLINK_MODE: u16 = 0o120777;
pub const EXTENTS_FL: u32 = 0x0008_0000;

/// Spawns an in-process inspector that speaks the debugfs protocol over
/// duplex pipes: banner first, then one echoed, prompt-terminated reply per
/// command line, in arrival order. Unknown commands get an empty body.
pub async fn scripted_session(
    replies: Vec<(String, String)>,
) -> (InspectorSession<DuplexStream>, CommandLog) {
    let (cmd_tx, cmd_rx) = duplex(256 * 1024);
    let (reply_tx, reply_rx) = duplex(256 * 1024);
    let log: CommandLog = Arc::new(Mutex::new(Vec::new()));
    let script: HashMap<String, String> = replies.into_iter().collect();

    let task_log = log.clone();
    tokio::spawn(async move {
        let mut out = reply_tx;
        out.write_all(format!("inspector 1.47 (test)\n{PROMPT}").as_bytes())
            .await
            .unwrap();
        let mut lines = BufReader::new(cmd_rx).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            task_log.lock().unwrap().push(line.clone());
            let body = script.get(&line).cloned().unwrap_or_default();
            out.write_all(format!("{line}\n{body}{PROMPT}").as_bytes())
                .await
                .unwrap();
        }
    });

    let session = InspectorSession::open(cmd_tx, reply_rx).await.unwrap();
    (session, log)
}

pub fn commands(log: &CommandLog) -> Vec<String> {
    log.lock().unwrap().clone()
}

/// Renders bytes the way the inspector dumps them: octal offset, eight
/// 4-hex-digit words, ASCII gutter.
pub fn hexdump(bytes: &[u8]) -> String {
    let mut text = String::new();
    for (i, chunk) in bytes.chunks(16).enumerate() {
        text.push_str(&format!("{:04o}  ", i * 16));
        for pair in chunk.chunks(2) {
            let hi = pair[0];
            let lo = pair.get(1).copied().unwrap_or(0);
            text.push_str(&format!("{hi:02x}{lo:02x} "));
        }
        text.push_str(" ................\n");
    }
    text
}

pub fn inode_bytes(mode: u16, sectors: u32, flags: u32, block_map: &[u8; 60]) -> Vec<u8> {
    let mut raw = vec![0u8; 256];
    raw[0..2].copy_from_slice(&mode.to_le_bytes());
    raw[28..32].copy_from_slice(&sectors.to_le_bytes());
    raw[32..36].copy_from_slice(&flags.to_le_bytes());
    raw[40..100].copy_from_slice(block_map);
    raw
}

fn extent_header(buf: &mut [u8], entries: u16, depth: u16) {
    buf[0..2].copy_from_slice(&0xF30Au16.to_le_bytes());
    buf[2..4].copy_from_slice(&entries.to_le_bytes());
    buf[4..6].copy_from_slice(&entries.to_le_bytes());
    buf[6..8].copy_from_slice(&depth.to_le_bytes());
}

fn extent_leaf_entries(buf: &mut [u8], extents: &[(u32, u16)]) {
    let mut logical = 0u32;
    for (i, &(first, count)) in extents.iter().enumerate() {
        let at = 12 * (i + 1);
        buf[at..at + 4].copy_from_slice(&logical.to_le_bytes());
        buf[at + 4..at + 6].copy_from_slice(&count.to_le_bytes());
        buf[at + 8..at + 12].copy_from_slice(&first.to_le_bytes());
        logical += u32::from(count);
    }
}

/// A depth-0 extent root for the inode's 60-byte mapping area.
pub fn extent_root_leaf(extents: &[(u32, u16)]) -> [u8; 60] {
    assert!(extents.len() <= 4);
    let mut buf = [0u8; 60];
    extent_header(&mut buf, extents.len() as u16, 0);
    extent_leaf_entries(&mut buf, extents);
    buf
}

/// A depth-1 extent root whose entries point at child node blocks.
pub fn extent_root_index(children: &[u32]) -> [u8; 60] {
    assert!(children.len() <= 4);
    let mut buf = [0u8; 60];
    extent_header(&mut buf, children.len() as u16, 1);
    for (i, &child) in children.iter().enumerate() {
        let at = 12 * (i + 1);
        buf[at..at + 4].copy_from_slice(&((i as u32) << 8).to_le_bytes());
        buf[at + 4..at + 8].copy_from_slice(&child.to_le_bytes());
    }
    buf
}

/// A full 4096-byte leaf node, as fetched via `block_dump`.
pub fn extent_block_leaf(extents: &[(u32, u16)]) -> Vec<u8> {
    let mut buf = vec![0u8; 4096];
    extent_header(&mut buf, extents.len() as u16, 0);
    extent_leaf_entries(&mut buf, extents);
    buf
}

/// The fifteen classic pointers packed into the 60-byte mapping area.
pub fn classic_block_map(direct: &[u32], single: u32, double: u32, triple: u32) -> [u8; 60] {
    assert!(direct.len() <= 12);
    let mut buf = [0u8; 60];
    for (i, &block) in direct.iter().enumerate() {
        buf[i * 4..i * 4 + 4].copy_from_slice(&block.to_le_bytes());
    }
    buf[48..52].copy_from_slice(&single.to_le_bytes());
    buf[52..56].copy_from_slice(&double.to_le_bytes());
    buf[56..60].copy_from_slice(&triple.to_le_bytes());
    buf
}

/// A 4096-byte block of little-endian u32 pointers.
pub fn pointer_block(pointers: &[u32]) -> Vec<u8> {
    assert!(pointers.len() <= 1024);
    let mut buf = vec![0u8; 4096];
    for (i, &p) in pointers.iter().enumerate() {
        buf[i * 4..i * 4 + 4].copy_from_slice(&p.to_le_bytes());
    }
    buf
}

/// `stats` reply body listing each group's inode table block.
pub fn stats_body(tables: &[(u32, u64)]) -> String {
    let mut text = String::from(
        "Filesystem volume name:   <none>\n\
         Filesystem features:      has_journal ext_attr dir_index filetype extent sparse_super large_file\n\
         Inodes per group:         8028\n",
    );
    for &(group, block) in tables {
        text.push_str(&format!(
            " Group {group}: block bitmap at 193, inode bitmap at 209, inode table at {block}\n"
        ));
    }
    text
}

pub fn ls_line(inode: u32, name: &str) -> String {
    format!("/{inode}/0100644/0/0/{name}/1024\n")
}

/// An `ls -p` body with `.`/`..` included, the way the inspector prints it.
pub fn ls_body(dir_inode: u32, parent_inode: u32, entries: &[(u32, &str)]) -> String {
    let mut text = format!("/{dir_inode}/040755/0/0/./4096\n/{parent_inode}/040755/0/0/../4096\n");
    for &(inode, name) in entries {
        text.push_str(&ls_line(inode, name));
    }
    text
}
