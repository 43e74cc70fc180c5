use serde::Serialize;

/// Which part of an object overlapped a damaged range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DamageKind {
    /// A file's data blocks.
    FileData,
    /// A directory's own data blocks; its listing cannot be trusted.
    DirectoryData,
    /// The 256-byte inode record itself; the object's type and contents
    /// cannot be determined.
    InodeRecord,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Finding {
    pub path: String,
    pub kind: DamageKind,
}

impl Finding {
    pub fn file_data(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            kind: DamageKind::FileData,
        }
    }

    pub fn directory_data(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            kind: DamageKind::DirectoryData,
        }
    }

    pub fn inode_record(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            kind: DamageKind::InodeRecord,
        }
    }
}

/// Receives findings as the walk discovers them.
pub trait ReportSink {
    fn report(&mut self, finding: Finding);
}

/// Line-oriented console output, one `BAD <path>` per finding.
pub struct ConsoleReporter;

impl ReportSink for ConsoleReporter {
    fn report(&mut self, finding: Finding) {
        println!("BAD {}", finding.path);
    }
}

/// One JSON object per finding, for downstream tooling.
pub struct JsonReporter;

impl ReportSink for JsonReporter {
    fn report(&mut self, finding: Finding) {
        let line = serde_json::to_string(&finding).expect("finding serializes");
        println!("{line}");
    }
}

impl ReportSink for Vec<Finding> {
    #[inline]
    fn report(&mut self, finding: Finding) {
        self.push(finding);
    }
}
