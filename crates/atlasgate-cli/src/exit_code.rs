//! Process exit codes.

pub const SUCCESS: u8 = 0;
pub const GENERAL_ERROR: u8 = 1;
/// Invalid arguments. clap exits with this code on its own parse errors.
pub const USAGE: u8 = 2;
/// Container magic, layout or authentication tag rejected.
pub const CONTAINER_INVALID: u8 = 3;
pub const NOT_FOUND: u8 = 4;
