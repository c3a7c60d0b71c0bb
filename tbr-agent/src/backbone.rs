use std::{collections::BTreeSet, net::Ipv6Addr};
use thiserror::Error;

use crate::stack::{BackboneRouterConfig, BackboneRouterState, MulticastListenerEvent, RadioStack};

#[derive(Error, Debug)]
pub enum SinkError {
    #[error("I/O Error")]
    Io(#[from] std::io::Error),
    #[error("Str utf8 parse Error")]
    StrParse(#[from] std::str::Utf8Error),
    #[error("Route command failed: {0}")]
    Command(String),
}

/// Trait to allow different implementations of the platform multicast
/// routing that projects mesh listeners onto the backbone
pub trait MulticastRouteSink: Send {
    /// Start forwarding multicast between the backbone and the mesh
    fn backbone_up(&mut self) -> Result<(), SinkError>;
    fn backbone_down(&mut self) -> Result<(), SinkError>;
    fn join_group(&mut self, group: Ipv6Addr) -> Result<(), SinkError>;
    fn leave_group(&mut self, group: Ipv6Addr) -> Result<(), SinkError>;
}

/// [`BackboneAgent`] tracks the backbone router role of this device and,
/// while it is the Primary backbone router, mirrors the mesh's multicast
/// listener registrations into the [`MulticastRouteSink`].
///
/// The listener table is only ever populated while Primary: it is filled
/// from the stack on entering Primary and drained (one leave per entry) on
/// leaving it. Route commands are best effort; a failed join or leave is
/// logged and the remaining entries are still processed
pub struct BackboneAgent {
    state: BackboneRouterState,
    listeners: BTreeSet<Ipv6Addr>,
    /// Local config last written back while Primary
    local_config: Option<BackboneRouterConfig>,
    sink: Box<dyn MulticastRouteSink>,
}

impl BackboneAgent {
    pub fn new(sink: Box<dyn MulticastRouteSink>) -> Self {
        Self {
            state: BackboneRouterState::Disabled,
            listeners: BTreeSet::new(),
            local_config: None,
            sink,
        }
    }

    /// Pick up whatever role the stack is already in
    pub fn init(&mut self, stack: &dyn RadioStack) {
        log::info!("Backbone agent starting");
        self.handle_backbone_router_state(stack);
    }

    pub fn state(&self) -> BackboneRouterState {
        self.state
    }

    pub fn is_primary(&self) -> bool {
        self.state == BackboneRouterState::Primary
    }

    pub fn listeners(&self) -> impl Iterator<Item = &Ipv6Addr> {
        self.listeners.iter()
    }

    pub fn local_config(&self) -> Option<BackboneRouterConfig> {
        self.local_config
    }

    pub fn handle_backbone_router_state(&mut self, stack: &dyn RadioStack) {
        let state = match stack.backbone_router_state() {
            Ok(state) => state,
            Err(e) => {
                log::error!("Unable to read backbone router state {e:}");
                return;
            }
        };

        if state == self.state {
            return;
        }

        log::info!("Backbone router state {} -> {}", self.state, state);
        let was_primary = self.is_primary();
        self.state = state;

        if self.is_primary() {
            self.enter_primary(stack);
        } else if was_primary {
            self.exit_primary();
        }
    }

    /// Local backbone router settings changed; only the Primary pushes
    /// them back into the stack. Writing the config back, even an unchanged
    /// one, makes the stack re-register as Primary with the current sequence
    /// number so the mesh picks up the new delay and timeout
    pub fn handle_backbone_router_local(&mut self, stack: &mut dyn RadioStack) {
        if !self.is_primary() {
            log::debug!("Ignoring backbone router local change while {}", self.state);
            return;
        }

        let config = match stack.backbone_router_config() {
            Ok(config) => config,
            Err(e) => {
                log::error!("Unable to read local backbone router config {e:}");
                return;
            }
        };

        match self.local_config {
            Some(previous) if previous == config => {
                log::debug!("Local backbone router config unchanged, re-applying {config:?}")
            }
            Some(previous) => {
                log::info!("Local backbone router config changed {previous:?} -> {config:?}")
            }
            None => log::info!("Applying local backbone router config {config:?}"),
        }

        match stack.set_backbone_router_config(&config) {
            Ok(()) => self.local_config = Some(config),
            Err(e) => log::error!("Failed to apply local backbone router config {e:}"),
        }
    }

    pub fn handle_multicast_listener_event(
        &mut self,
        event: MulticastListenerEvent,
        address: Ipv6Addr,
    ) {
        if !self.is_primary() {
            log::warn!("Ignoring multicast listener {event:?} for {address} while {}", self.state);
            return;
        }

        match event {
            MulticastListenerEvent::Added => {
                if self.listeners.insert(address) {
                    log::info!("Multicast listener added {address}");
                    self.join(address);
                } else {
                    log::debug!("Multicast listener {address} already present");
                }
            }
            MulticastListenerEvent::Removed => {
                if self.listeners.remove(&address) {
                    log::info!("Multicast listener removed {address}");
                    self.leave(address);
                } else {
                    log::debug!("Multicast listener {address} not present");
                }
            }
        }
    }

    fn enter_primary(&mut self, stack: &dyn RadioStack) {
        self.backbone_up();

        let members = stack.multicast_listeners().unwrap_or_else(|e| {
            log::error!("Unable to read multicast listeners {e:}");
            vec![]
        });

        for address in members {
            if self.listeners.insert(address) {
                self.join(address);
            }
        }
        log::info!("Entered Primary with {} multicast listener(s)", self.listeners.len());
    }

    fn exit_primary(&mut self) {
        for address in std::mem::take(&mut self.listeners) {
            self.leave(address);
        }
        self.local_config = None;
        self.backbone_down();
        log::info!("Exited Primary");
    }

    fn backbone_up(&mut self) {
        if let Err(e) = self.sink.backbone_up() {
            log::error!("Failed to bring backbone multicast forwarding up {e:}");
        }
    }

    fn backbone_down(&mut self) {
        if let Err(e) = self.sink.backbone_down() {
            log::error!("Failed to bring backbone multicast forwarding down {e:}");
        }
    }

    fn join(&mut self, address: Ipv6Addr) {
        if let Err(e) = self.sink.join_group(address) {
            log::error!("Failed to join multicast group {address} {e:}");
        }
    }

    fn leave(&mut self, address: Ipv6Addr) {
        if let Err(e) = self.sink.leave_group(address) {
            log::error!("Failed to leave multicast group {address} {e:}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockSink, MockStack, SinkCommand, StackCall};

    fn addr(s: &str) -> Ipv6Addr {
        s.parse().unwrap()
    }

    fn agent() -> (BackboneAgent, MockSink) {
        let sink = MockSink::default();
        (BackboneAgent::new(Box::new(sink.clone())), sink)
    }

    fn table(agent: &BackboneAgent) -> Vec<Ipv6Addr> {
        agent.listeners().copied().collect()
    }

    fn become_primary(agent: &mut BackboneAgent, stack: &MockStack, members: &[&str]) {
        {
            let mut state = stack.state();
            state.bbr_state = BackboneRouterState::Primary;
            state.listeners = members.iter().map(|m| addr(m)).collect();
        }
        agent.handle_backbone_router_state(stack);
    }

    #[test]
    fn entering_primary_joins_stack_membership() {
        let _ = env_logger::builder().is_test(true).try_init();
        let stack = MockStack::default();
        let (mut agent, sink) = agent();

        agent.init(&stack);
        assert_eq!(agent.state(), BackboneRouterState::Disabled);
        assert!(sink.commands().is_empty());

        become_primary(&mut agent, &stack, &["ff02::1", "ff02::2"]);

        assert!(agent.is_primary());
        assert_eq!(table(&agent), vec![addr("ff02::1"), addr("ff02::2")]);
        assert_eq!(
            sink.commands(),
            vec![
                SinkCommand::Up,
                SinkCommand::Join(addr("ff02::1")),
                SinkCommand::Join(addr("ff02::2")),
            ]
        );
    }

    #[test]
    fn init_enters_primary_if_stack_already_primary() {
        let stack = MockStack::default();
        stack.state().bbr_state = BackboneRouterState::Primary;
        stack.state().listeners = vec![addr("ff05::abcd")];
        let (mut agent, sink) = agent();

        agent.init(&stack);

        assert!(agent.is_primary());
        assert_eq!(
            sink.commands(),
            vec![SinkCommand::Up, SinkCommand::Join(addr("ff05::abcd"))]
        );
    }

    #[test]
    fn added_listener_while_primary() {
        let stack = MockStack::default();
        let (mut agent, sink) = agent();
        become_primary(&mut agent, &stack, &["ff02::1"]);
        sink.state().commands.clear();

        agent.handle_multicast_listener_event(MulticastListenerEvent::Added, addr("ff02::3"));
        // Already present: idempotent
        agent.handle_multicast_listener_event(MulticastListenerEvent::Added, addr("ff02::3"));

        assert_eq!(table(&agent), vec![addr("ff02::1"), addr("ff02::3")]);
        assert_eq!(sink.commands(), vec![SinkCommand::Join(addr("ff02::3"))]);
    }

    #[test]
    fn removing_absent_listener_is_noop() {
        let stack = MockStack::default();
        let (mut agent, sink) = agent();
        become_primary(&mut agent, &stack, &["ff02::1"]);
        sink.state().commands.clear();

        agent.handle_multicast_listener_event(MulticastListenerEvent::Removed, addr("ff02::9"));
        assert_eq!(table(&agent), vec![addr("ff02::1")]);
        assert!(sink.commands().is_empty());

        agent.handle_multicast_listener_event(MulticastListenerEvent::Removed, addr("ff02::1"));
        assert!(table(&agent).is_empty());
        assert_eq!(sink.commands(), vec![SinkCommand::Leave(addr("ff02::1"))]);
    }

    #[test]
    fn exiting_primary_leaves_every_entry() {
        let stack = MockStack::default();
        let (mut agent, sink) = agent();
        become_primary(&mut agent, &stack, &["ff02::1", "ff02::2"]);
        agent.handle_multicast_listener_event(MulticastListenerEvent::Added, addr("ff02::3"));
        sink.state().commands.clear();

        stack.state().bbr_state = BackboneRouterState::Backup;
        agent.handle_backbone_router_state(&stack);

        assert_eq!(agent.state(), BackboneRouterState::Backup);
        assert!(table(&agent).is_empty());
        let commands = sink.commands();
        assert_eq!(commands.len(), 4);
        for group in ["ff02::1", "ff02::2", "ff02::3"] {
            assert!(commands.contains(&SinkCommand::Leave(addr(group))));
        }
        assert_eq!(commands.last(), Some(&SinkCommand::Down));
    }

    #[test]
    fn events_ignored_when_not_primary() {
        let stack = MockStack::default();
        let (mut agent, sink) = agent();
        stack.state().bbr_state = BackboneRouterState::Backup;
        agent.handle_backbone_router_state(&stack);

        agent.handle_multicast_listener_event(MulticastListenerEvent::Added, addr("ff02::3"));

        assert!(table(&agent).is_empty());
        assert!(sink.commands().is_empty());
    }

    #[test]
    fn disabled_backup_transitions_touch_nothing() {
        let stack = MockStack::default();
        let (mut agent, sink) = agent();

        for state in [
            BackboneRouterState::Backup,
            BackboneRouterState::Disabled,
            BackboneRouterState::Backup,
        ] {
            stack.state().bbr_state = state;
            agent.handle_backbone_router_state(&stack);
            assert_eq!(agent.state(), state);
        }
        assert!(sink.commands().is_empty());
    }

    #[test]
    fn re_entering_primary_starts_from_scratch() {
        let stack = MockStack::default();
        let (mut agent, sink) = agent();
        become_primary(&mut agent, &stack, &["ff02::1", "ff02::2"]);

        stack.state().bbr_state = BackboneRouterState::Disabled;
        agent.handle_backbone_router_state(&stack);
        sink.state().commands.clear();

        become_primary(&mut agent, &stack, &["ff02::2", "ff03::fc"]);

        assert_eq!(table(&agent), vec![addr("ff02::2"), addr("ff03::fc")]);
        assert_eq!(
            sink.commands(),
            vec![
                SinkCommand::Up,
                SinkCommand::Join(addr("ff02::2")),
                SinkCommand::Join(addr("ff03::fc")),
            ]
        );
    }

    #[test]
    fn failed_route_commands_do_not_stop_replay() {
        let stack = MockStack::default();
        let (mut agent, sink) = agent();
        sink.state().failing.insert(addr("ff02::1"));

        become_primary(&mut agent, &stack, &["ff02::1", "ff02::2"]);
        assert_eq!(table(&agent), vec![addr("ff02::1"), addr("ff02::2")]);
        assert!(sink.commands().contains(&SinkCommand::Join(addr("ff02::2"))));

        stack.state().bbr_state = BackboneRouterState::Disabled;
        agent.handle_backbone_router_state(&stack);
        assert!(table(&agent).is_empty());
        assert!(sink.commands().contains(&SinkCommand::Leave(addr("ff02::2"))));
        assert_eq!(sink.commands().last(), Some(&SinkCommand::Down));
    }

    #[test]
    fn local_config_applied_only_when_primary() {
        let mut stack = MockStack::default();
        let (mut agent, _sink) = agent();
        let config = BackboneRouterConfig {
            sequence_number: 10,
            reregistration_delay: 120,
            mlr_timeout: 300,
        };
        stack.state().bbr_config = config;

        agent.handle_backbone_router_local(&mut stack);
        assert!(stack.calls().is_empty());
        assert_eq!(agent.local_config(), None);

        become_primary(&mut agent, &stack, &[]);
        agent.handle_backbone_router_local(&mut stack);
        assert_eq!(stack.calls(), vec![StackCall::SetBackboneRouterConfig(config)]);
        assert_eq!(agent.local_config(), Some(config));
    }

    #[test]
    fn local_config_change_tracked_and_reapplied() {
        let mut stack = MockStack::default();
        let (mut agent, _sink) = agent();
        let first = BackboneRouterConfig {
            sequence_number: 10,
            reregistration_delay: 120,
            mlr_timeout: 300,
        };
        let second = BackboneRouterConfig {
            sequence_number: 11,
            ..first
        };
        stack.state().bbr_config = first;
        become_primary(&mut agent, &stack, &[]);

        agent.handle_backbone_router_local(&mut stack);
        // Unchanged config is still written back to refresh registration
        agent.handle_backbone_router_local(&mut stack);
        stack.state().bbr_config = second;
        agent.handle_backbone_router_local(&mut stack);

        assert_eq!(
            stack.calls(),
            vec![
                StackCall::SetBackboneRouterConfig(first),
                StackCall::SetBackboneRouterConfig(first),
                StackCall::SetBackboneRouterConfig(second),
            ]
        );
        assert_eq!(agent.local_config(), Some(second));

        stack.state().bbr_state = BackboneRouterState::Backup;
        agent.handle_backbone_router_state(&stack);
        assert_eq!(agent.local_config(), None);
    }
}
