// Thin re-export module: implementation is in `blockchain/core.rs`.

pub mod core;
pub use self::core::*;
