//! The `tbr-agent` crate is the control core of a Thread border router,
//! the process that bridges a Thread mesh to a backbone (Ethernet / Wi-Fi)
//! network. It sits on top of the OpenThread stack, reached through the
//! [`RadioStack`] trait, and has the following responsibilities:
//! 1. Expose the stack's one-shot network operations (active scan, attach,
//!    joiner start) as request / result pairs via [`ThreadHelper`]. Attach
//!    and join exclude each other, unspecified network parameters (PAN ID,
//!    extended PAN ID, network key, PSKc, channel) are derived at random,
//!    and unsecure ports opened with a timeout are closed once it elapses.
//! 2. Track the backbone router role of the device via [`BackboneAgent`].
//!    While the device is the Primary backbone router, every multicast
//!    listener registered in the mesh is mirrored into a
//!    [`MulticastRouteSink`] so traffic for the group is forwarded from the
//!    backbone into the mesh.
//!
//! Both are owned by the [`Agent`] [`actix::Actor`], which is driven by an
//! event pump sending it [`Process`] messages. All stack notifications are
//! delivered from inside that one handler, in the order the stack produced
//! them.
//!
//! # Examples
//! ```no_run
//! use rand::{rngs::StdRng, SeedableRng};
//! use tbr_agent::{Agent, OtCliStack, Process, Scan, SmcRouteSink};
//!
//! #[actix::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut agent = Agent::new(
//!         Box::new(OtCliStack::new("wpan0")),
//!         Box::new(SmcRouteSink::new("wpan0", "eth0")),
//!         Box::new(StdRng::from_entropy()),
//!     );
//!     agent.init()?;
//!     let agent = actix::Actor::start(agent);
//!
//!     let results = agent.send(Scan).await??;
//!     agent.send(Process).await?;
//!     for network in results.await?? {
//!         log::info!("Found {} on channel {}", network.network_name, network.channel);
//!     }
//!     Ok(())
//! }
//! ```

mod agent;
mod backbone;
mod client;
mod error;
mod helper;
#[cfg(test)]
mod mock;
mod stack;

pub use agent::{
    AddDeviceRoleHandler, AddUnsecurePort, Agent, Attach, JoinerStart, Process, Reset,
    ResultReceiver, Scan, ScanReceiver, SweepUnsecurePorts,
};
pub use backbone::{BackboneAgent, MulticastRouteSink, SinkError};
pub use client::{OtCliStack, OtClientError, SmcRouteSink};
pub use error::{OtError, ThreadError};
pub use helper::{
    AttachParams, DeviceRoleHandler, ResultHandler, ScanHandler, ThreadHelper,
    EXT_PAN_ID_UNSPECIFIED, PAN_ID_UNSPECIFIED,
};
pub use stack::{
    ActiveScanResult, BackboneRouterConfig, BackboneRouterState, ChangedFlags, ChannelMask,
    Dataset, DeviceRole, ExtPanId, JoinerParams, MulticastListenerEvent, NetworkKey, PanId, Pskc,
    RadioStack, StackEvent, KEY_SIZE, MAX_NETWORK_NAME_SIZE,
};
