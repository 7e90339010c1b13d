//! CLI subcommand implementations.

pub mod export;
pub mod import;
pub mod init;
pub mod log;
pub mod record;
pub mod status;
pub mod sync;
pub mod util;
