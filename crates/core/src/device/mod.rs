//! Robot controller connectivity.
//!
//! The [`DeviceLink`] owns the single controller session, the
//! [`DeviceListener`] feeds it accepted TCP connections, and the
//! [`Correlator`] turns the fire-and-forget wire protocol into
//! "send X, wait for Y" round trips.

mod correlator;
mod link;
mod listener;
pub mod protocol;

pub use correlator::{Correlator, ExpectOutcome, MismatchPolicy};
pub use link::{DeviceLink, Inbox, LinkError, SessionInfo};
pub use listener::DeviceListener;
pub use protocol::{Bin, Command};
