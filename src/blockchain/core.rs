// core.rs splits block sealing, chain management, and integrity checks into submodules.
pub mod block;
pub mod chain;
pub mod validation;

pub use block::*;
pub use chain::*;
pub use validation::*;
