//! In-memory stack and route sink that record what the agent asked of them

use std::{
    collections::{HashSet, VecDeque},
    net::Ipv6Addr,
    sync::{Arc, Mutex, MutexGuard},
};

use crate::{
    backbone::{MulticastRouteSink, SinkError},
    stack::{
        BackboneRouterConfig, BackboneRouterState, Dataset, DeviceRole, JoinerParams,
        RadioStack, StackEvent,
    },
    OtError,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StackCall {
    ActiveScan,
    Attach(Dataset),
    JoinerStart(JoinerParams),
    ThreadSetEnabled(bool),
    AddUnsecurePort(u16),
    RemoveUnsecurePort(u16),
    Reset,
    SetBackboneRouterConfig(BackboneRouterConfig),
}

pub struct MockState {
    pub role: DeviceRole,
    pub bbr_state: BackboneRouterState,
    pub bbr_config: BackboneRouterConfig,
    pub listeners: Vec<Ipv6Addr>,
    pub events: VecDeque<StackEvent>,
    pub calls: Vec<StackCall>,
    pub fail_scan: Option<OtError>,
    pub fail_attach: Option<OtError>,
    pub fail_add_port: Option<OtError>,
}

impl Default for MockState {
    fn default() -> Self {
        Self {
            role: DeviceRole::Disabled,
            bbr_state: BackboneRouterState::Disabled,
            bbr_config: BackboneRouterConfig::default(),
            listeners: vec![],
            events: VecDeque::new(),
            calls: vec![],
            fail_scan: None,
            fail_attach: None,
            fail_add_port: None,
        }
    }
}

/// Cloneable handle so a test can keep inspecting a stack it handed to an
/// [`Agent`](crate::Agent)
#[derive(Clone, Default)]
pub struct MockStack(Arc<Mutex<MockState>>);

impl MockStack {
    pub fn state(&self) -> MutexGuard<'_, MockState> {
        self.0.lock().unwrap()
    }

    pub fn calls(&self) -> Vec<StackCall> {
        self.state().calls.clone()
    }

    pub fn push_event(&self, event: StackEvent) {
        self.state().events.push_back(event);
    }

    fn record(&self, call: StackCall) {
        self.state().calls.push(call);
    }
}

impl RadioStack for MockStack {
    fn process(&mut self) -> Vec<StackEvent> {
        self.state().events.drain(..).collect()
    }

    fn active_scan(&mut self) -> Result<(), OtError> {
        if let Some(e) = self.state().fail_scan.clone() {
            return Err(e);
        }
        self.record(StackCall::ActiveScan);
        Ok(())
    }

    fn attach(&mut self, dataset: &Dataset) -> Result<(), OtError> {
        if let Some(e) = self.state().fail_attach.clone() {
            return Err(e);
        }
        self.record(StackCall::Attach(dataset.clone()));
        Ok(())
    }

    fn joiner_start(&mut self, params: &JoinerParams) -> Result<(), OtError> {
        self.record(StackCall::JoinerStart(params.clone()));
        Ok(())
    }

    fn thread_set_enabled(&mut self, enabled: bool) -> Result<(), OtError> {
        self.record(StackCall::ThreadSetEnabled(enabled));
        Ok(())
    }

    fn add_unsecure_port(&mut self, port: u16) -> Result<(), OtError> {
        if let Some(e) = self.state().fail_add_port.clone() {
            return Err(e);
        }
        self.record(StackCall::AddUnsecurePort(port));
        Ok(())
    }

    fn remove_unsecure_port(&mut self, port: u16) -> Result<(), OtError> {
        self.record(StackCall::RemoveUnsecurePort(port));
        Ok(())
    }

    fn reset(&mut self) -> Result<(), OtError> {
        self.record(StackCall::Reset);
        Ok(())
    }

    fn device_role(&self) -> Result<DeviceRole, OtError> {
        Ok(self.state().role)
    }

    fn backbone_router_state(&self) -> Result<BackboneRouterState, OtError> {
        Ok(self.state().bbr_state)
    }

    fn backbone_router_config(&self) -> Result<BackboneRouterConfig, OtError> {
        Ok(self.state().bbr_config)
    }

    fn set_backbone_router_config(
        &mut self,
        config: &BackboneRouterConfig,
    ) -> Result<(), OtError> {
        self.record(StackCall::SetBackboneRouterConfig(*config));
        Ok(())
    }

    fn multicast_listeners(&self) -> Result<Vec<Ipv6Addr>, OtError> {
        Ok(self.state().listeners.clone())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkCommand {
    Up,
    Down,
    Join(Ipv6Addr),
    Leave(Ipv6Addr),
}

#[derive(Default)]
pub struct MockSinkState {
    pub commands: Vec<SinkCommand>,
    /// Groups whose join / leave fails
    pub failing: HashSet<Ipv6Addr>,
}

#[derive(Clone, Default)]
pub struct MockSink(Arc<Mutex<MockSinkState>>);

impl MockSink {
    pub fn state(&self) -> MutexGuard<'_, MockSinkState> {
        self.0.lock().unwrap()
    }

    pub fn commands(&self) -> Vec<SinkCommand> {
        self.state().commands.clone()
    }

    fn record(&self, command: SinkCommand) -> Result<(), SinkError> {
        let mut state = self.state();
        state.commands.push(command);
        match command {
            SinkCommand::Join(group) | SinkCommand::Leave(group)
                if state.failing.contains(&group) =>
            {
                Err(SinkError::Command(format!("{command:?} rejected")))
            }
            _ => Ok(()),
        }
    }
}

impl MulticastRouteSink for MockSink {
    fn backbone_up(&mut self) -> Result<(), SinkError> {
        self.record(SinkCommand::Up)
    }

    fn backbone_down(&mut self) -> Result<(), SinkError> {
        self.record(SinkCommand::Down)
    }

    fn join_group(&mut self, group: Ipv6Addr) -> Result<(), SinkError> {
        self.record(SinkCommand::Join(group))
    }

    fn leave_group(&mut self, group: Ipv6Addr) -> Result<(), SinkError> {
        self.record(SinkCommand::Leave(group))
    }
}
