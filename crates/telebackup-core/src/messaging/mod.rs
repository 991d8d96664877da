//! Platform client abstractions (MTProto today; any client that can read channel history later).

pub mod paging;
pub mod port;
pub mod throttled;
pub mod types;
