mod cache;
mod host_shard;
pub mod records;
mod renter_session;
mod renter_shard;
pub mod states;
pub mod status;

pub use cache::{LiveMap, ObjectCache};
pub use host_shard::{HostShard, NegotiationTerms};
pub use renter_session::RenterSession;
pub use renter_shard::RenterShard;
pub use states::{
    HostShardState, RenterShardState, SessionEvent, SessionState, TransitionError,
};
pub use status::{query_status, SessionStatusView, ShardStatusView};
