//! # scrawl-replication
//!
//! Lets several server processes serve the same lobby.
//!
//! Each lobby has exactly one *reference* process, the one that created
//! it, which runs the lobby actor. Other processes are *followers*: they
//! accept sockets for the lobby but keep no game state. Two bus channels
//! connect them:
//!
//! ```text
//!  follower socket ─┐                              ┌─> follower ConnectionTable
//!  reference socket ┴─> {id}-in ─> lobby actor ─> {id}-out ┴─> reference ConnectionTable
//! ```
//!
//! With replication on, every player command travels over `{id}-in`,
//! including those from sockets on the reference itself, so the actor
//! applies them in bus order. Every frame the actor sends goes out on
//! `{id}-out` and is delivered by whichever process holds the socket.
//!
//! Joins from a follower also go to the reference, as a `join` frame on
//! `{id}-in`. The reference answers on a channel named in the request,
//! so seat limits are checked in one place.
//!
//! There is no failover. If the reference dies, the lobby stops.

mod bus;
mod error;
mod frame;
mod join;
mod listener;
mod publisher;

pub use bus::{Bus, MemoryBus, RedisBus, Subscription};
pub use error::BusError;
pub use frame::{
    BusFrame, ConnectInfo, FrameKind, JoinReply, JoinRequest, inbound_channel,
    join_reply_channel, outbound_channel,
};
pub use join::request_join;
pub use listener::{spawn_inbound, spawn_outbound};
pub use publisher::{BusDispatch, BusIngress, Publisher};
