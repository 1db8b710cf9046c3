mod audit_log;
mod order;
mod role;

pub use audit_log::*;
pub use order::*;
pub use role::*;
