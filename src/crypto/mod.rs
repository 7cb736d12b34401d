pub mod identity;
pub mod signature;

pub use identity::NodeIdentity;
