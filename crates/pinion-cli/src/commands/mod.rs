pub mod assign;
pub mod evaluate;
pub mod operate;

/// Attempts before giving up on a conflicting document write.
pub const MAX_WRITE_ATTEMPTS: u32 = 3;
