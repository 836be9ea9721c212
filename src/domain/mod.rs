//! Core data model shared by every stage of a build.

pub mod block;
pub mod record;
pub mod settings;

pub use block::{CodeBlock, CommandKind, CustomCodePosition};
pub use record::{
    DepToken, ExitStatus, Fingerprint, HighlightEntry, SessionRecord, Vitals, STORE_FORMAT_VERSION,
};
pub use settings::{DependencyMode, GobbleMode, HighlightSettings, RerunPolicy, Settings};
