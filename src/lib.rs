pub mod damage;
pub mod ext;
pub mod hexdump;
pub mod inspector;
pub mod report;
pub mod walker;

pub use damage::{BadRange, DamageMap};
pub use ext::inode::{InodeKind, InodeRecord};
pub use ext::layout::FsLayout;
pub use inspector::{InspectorError, InspectorSession, PROMPT};
pub use report::{ConsoleReporter, DamageKind, Finding, JsonReporter, ReportSink};
pub use walker::{WalkError, WalkStats, Walker, ROOT_INODE};
