mod contract;
mod packets;

pub use contract::*;
pub use packets::*;
