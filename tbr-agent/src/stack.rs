//! Types and trait describing the OpenThread stack as seen by the agent.
//!
//! The stack is an opaque service: the agent issues one-shot requests
//! through [`RadioStack`] and picks up everything the stack reports back
//! (state changes, scan results, joiner completion, multicast listener
//! events) by draining [`RadioStack::process`] once per poll iteration.

use bitflags::bitflags;
use std::{fmt, net::Ipv6Addr, str::FromStr};

use crate::OtError;

pub type PanId = u16;
pub type ExtPanId = u64;
pub type ChannelMask = u32;

/// Network key and PSKc length required by the stack
pub const KEY_SIZE: usize = 16;

pub type NetworkKey = [u8; KEY_SIZE];
pub type Pskc = [u8; KEY_SIZE];

/// Longest network name the stack accepts, in bytes
pub const MAX_NETWORK_NAME_SIZE: usize = 16;

bitflags! {
    /// Subset of the stack's change flags the agent reacts to
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ChangedFlags: u32 {
        const THREAD_ROLE = 1 << 2;
        const BACKBONE_ROUTER_STATE = 1 << 25;
        const BACKBONE_ROUTER_LOCAL = 1 << 26;
        const ACTIVE_DATASET = 1 << 28;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceRole {
    Disabled,
    Detached,
    Child,
    Router,
    Leader,
}

impl DeviceRole {
    /// True once the device is part of a Thread partition
    pub fn is_attached(&self) -> bool {
        matches!(self, DeviceRole::Child | DeviceRole::Router | DeviceRole::Leader)
    }
}

impl fmt::Display for DeviceRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DeviceRole::Disabled => "disabled",
            DeviceRole::Detached => "detached",
            DeviceRole::Child => "child",
            DeviceRole::Router => "router",
            DeviceRole::Leader => "leader",
        };
        f.write_str(s)
    }
}

impl FromStr for DeviceRole {
    type Err = OtError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "disabled" => Ok(DeviceRole::Disabled),
            "detached" => Ok(DeviceRole::Detached),
            "child" => Ok(DeviceRole::Child),
            "router" => Ok(DeviceRole::Router),
            "leader" => Ok(DeviceRole::Leader),
            other => Err(OtError::Adapter(format!("Unknown device role {other:?}"))),
        }
    }
}

/// Backbone router role of this device. The stack calls the backup role
/// "Secondary"
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BackboneRouterState {
    #[default]
    Disabled,
    Primary,
    Backup,
}

impl fmt::Display for BackboneRouterState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BackboneRouterState::Disabled => "Disabled",
            BackboneRouterState::Primary => "Primary",
            BackboneRouterState::Backup => "Backup",
        };
        f.write_str(s)
    }
}

impl FromStr for BackboneRouterState {
    type Err = OtError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "Disabled" => Ok(BackboneRouterState::Disabled),
            "Primary" => Ok(BackboneRouterState::Primary),
            "Secondary" | "Backup" => Ok(BackboneRouterState::Backup),
            other => Err(OtError::Adapter(format!("Unknown backbone router state {other:?}"))),
        }
    }
}

/// Locally configured backbone router settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BackboneRouterConfig {
    pub sequence_number: u8,
    /// Reregistration delay in seconds
    pub reregistration_delay: u16,
    /// Multicast listener registration timeout in seconds
    pub mlr_timeout: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MulticastListenerEvent {
    Added,
    Removed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveScanResult {
    pub ext_address: [u8; 8],
    pub network_name: String,
    pub ext_pan_id: ExtPanId,
    pub pan_id: PanId,
    pub channel: u8,
    pub rssi: i8,
    pub lqi: u8,
    pub is_joinable: bool,
}

/// Fully resolved operational dataset committed on attach
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dataset {
    pub network_name: String,
    pub pan_id: PanId,
    pub ext_pan_id: ExtPanId,
    pub network_key: NetworkKey,
    pub pskc: Pskc,
    pub channel: u8,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JoinerParams {
    pub pskd: String,
    pub provisioning_url: String,
    pub vendor_name: String,
    pub vendor_model: String,
    pub vendor_sw_version: String,
    pub vendor_data: String,
}

/// Everything the stack reports back out of band
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StackEvent {
    StateChanged(ChangedFlags),
    ScanResult(ActiveScanResult),
    /// End of an active scan, carrying the stack's completion status
    ScanDone(Result<(), OtError>),
    JoinerComplete(Result<(), OtError>),
    /// Attach gave up, e.g. with [`OtError::ResponseTimeout`]
    AttachFailed(OtError),
    MulticastListener {
        event: MulticastListenerEvent,
        address: Ipv6Addr,
    },
}

/// Trait to allow different implementations for interfacing with the
/// OpenThread stack
pub trait RadioStack: Send {
    /// Let the stack run its pending work and hand back what it reported,
    /// in the order it was generated
    fn process(&mut self) -> Vec<StackEvent>;

    fn active_scan(&mut self) -> Result<(), OtError>;
    fn attach(&mut self, dataset: &Dataset) -> Result<(), OtError>;
    fn joiner_start(&mut self, params: &JoinerParams) -> Result<(), OtError>;
    fn thread_set_enabled(&mut self, enabled: bool) -> Result<(), OtError>;
    fn add_unsecure_port(&mut self, port: u16) -> Result<(), OtError>;
    fn remove_unsecure_port(&mut self, port: u16) -> Result<(), OtError>;
    fn reset(&mut self) -> Result<(), OtError>;

    fn device_role(&self) -> Result<DeviceRole, OtError>;
    fn backbone_router_state(&self) -> Result<BackboneRouterState, OtError>;
    fn backbone_router_config(&self) -> Result<BackboneRouterConfig, OtError>;
    fn set_backbone_router_config(
        &mut self,
        config: &BackboneRouterConfig,
    ) -> Result<(), OtError>;
    /// Multicast listeners currently registered with the backbone router
    fn multicast_listeners(&self) -> Result<Vec<Ipv6Addr>, OtError>;
}
