//! Contract bindings used by the engine

pub mod erc20;
pub mod errors;
pub mod linking;
pub mod smart_account;

pub use erc20::*;
pub use errors::*;
pub use linking::*;
pub use smart_account::*;
