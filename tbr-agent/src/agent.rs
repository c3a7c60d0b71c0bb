use actix::prelude::*;
use rand::RngCore;
use tokio::sync::oneshot;

use crate::{
    backbone::{BackboneAgent, MulticastRouteSink},
    helper::{AttachParams, DeviceRoleHandler, ResultHandler, ScanHandler, ThreadHelper},
    stack::{ActiveScanResult, ChangedFlags, DeviceRole, JoinerParams, RadioStack, StackEvent},
    OtError, ThreadError,
};

/// [`Agent`] owns the stack handle together with the [`ThreadHelper`] and
/// the [`BackboneAgent`], and is the single point where stack events are
/// delivered. Each call to [`Agent::process`] drains whatever the stack has
/// reported since the last call and dispatches it in order. For one
/// [`StackEvent::StateChanged`] the order is fixed: device role first, then
/// backbone router state, then backbone router local config
pub struct Agent {
    /// Dynamic trait object that implements the needed traits to
    /// interface with the OpenThread stack
    stack: Box<dyn RadioStack>,
    helper: ThreadHelper,
    backbone: BackboneAgent,
}

impl Agent {
    pub fn new(
        stack: Box<dyn RadioStack>,
        sink: Box<dyn MulticastRouteSink>,
        rng: Box<dyn RngCore + Send>,
    ) -> Self {
        Self {
            stack,
            helper: ThreadHelper::new(rng),
            backbone: BackboneAgent::new(sink),
        }
    }

    pub fn init(&mut self) -> Result<DeviceRole, OtError> {
        let role = self.helper.init(self.stack.as_ref())?;
        self.backbone.init(self.stack.as_ref());
        Ok(role)
    }

    pub fn helper(&self) -> &ThreadHelper {
        &self.helper
    }

    pub fn backbone(&self) -> &BackboneAgent {
        &self.backbone
    }

    /// Drain and dispatch pending stack events, returning how many there were
    pub fn process(&mut self) -> usize {
        let events = self.stack.process();
        let count = events.len();
        for event in events {
            self.dispatch(event);
        }
        count
    }

    fn dispatch(&mut self, event: StackEvent) {
        log::trace!("Stack event {event:?}");
        match event {
            StackEvent::StateChanged(flags) => {
                self.helper.handle_state_changed(self.stack.as_ref(), flags);

                let role_or_state = ChangedFlags::THREAD_ROLE | ChangedFlags::BACKBONE_ROUTER_STATE;
                if flags.intersects(role_or_state) {
                    self.backbone.handle_backbone_router_state(self.stack.as_ref());
                }
                if flags.contains(ChangedFlags::BACKBONE_ROUTER_LOCAL) {
                    self.backbone.handle_backbone_router_local(self.stack.as_mut());
                }
            }
            StackEvent::ScanResult(result) => self.helper.handle_scan_result(result),
            StackEvent::ScanDone(status) => self.helper.handle_scan_done(status),
            StackEvent::JoinerComplete(result) => {
                self.helper.handle_joiner_complete(self.stack.as_mut(), result)
            }
            StackEvent::AttachFailed(error) => self.helper.handle_attach_failed(error),
            StackEvent::MulticastListener { event, address } => {
                self.backbone.handle_multicast_listener_event(event, address)
            }
        }
    }

    pub fn scan(&mut self, handler: ScanHandler) -> Result<(), OtError> {
        self.helper.scan(self.stack.as_mut(), handler)
    }

    pub fn attach(
        &mut self,
        params: AttachParams,
        handler: ResultHandler,
    ) -> Result<(), ThreadError> {
        self.helper.attach(self.stack.as_mut(), params, handler)
    }

    pub fn joiner_start(
        &mut self,
        params: JoinerParams,
        handler: ResultHandler,
    ) -> Result<(), ThreadError> {
        self.helper.joiner_start(self.stack.as_mut(), params, handler)
    }

    pub fn reset(&mut self) -> Result<(), OtError> {
        self.helper.reset(self.stack.as_mut())
    }

    pub fn add_unsecure_port(&mut self, port: u16, seconds: u32) -> Result<(), OtError> {
        self.helper.add_unsecure_port(self.stack.as_mut(), port, seconds)
    }

    pub fn sweep_unsecure_ports(&mut self) {
        self.helper.sweep_unsecure_ports(self.stack.as_mut())
    }

    pub fn add_device_role_handler(&mut self, handler: DeviceRoleHandler) {
        self.helper.add_device_role_handler(handler)
    }
}

impl Actor for Agent {
    type Context = Context<Self>;

    fn started(&mut self, _ctx: &mut Self::Context) {
        log::info!("Thread border router agent started");
    }
}

/// Drive the stack: deliver everything it reported since the last tick
#[derive(Message)]
#[rtype(result = "usize")]
pub struct Process;

impl Handler<Process> for Agent {
    type Result = usize;

    fn handle(&mut self, _msg: Process, _ctx: &mut Self::Context) -> Self::Result {
        self.process()
    }
}

/// Close unsecure ports whose timeout has elapsed
#[derive(Message)]
#[rtype(result = "()")]
pub struct SweepUnsecurePorts;

impl Handler<SweepUnsecurePorts> for Agent {
    type Result = ();

    fn handle(&mut self, _msg: SweepUnsecurePorts, _ctx: &mut Self::Context) -> Self::Result {
        self.sweep_unsecure_ports()
    }
}

pub type ScanReceiver = oneshot::Receiver<Result<Vec<ActiveScanResult>, OtError>>;
pub type ResultReceiver = oneshot::Receiver<Result<(), ThreadError>>;

/// Start an active scan. The returned receiver resolves once the scan
/// finishes; it is dropped without a value if a later scan took over
#[derive(Message)]
#[rtype(result = "ScanResponse")]
pub struct Scan;
type ScanResponse = Result<ScanReceiver, OtError>;

impl Handler<Scan> for Agent {
    type Result = ScanResponse;

    fn handle(&mut self, _msg: Scan, _ctx: &mut Self::Context) -> Self::Result {
        let (tx, rx) = oneshot::channel();
        self.scan(Box::new(move |res| {
            if tx.send(res).is_err() {
                log::warn!("Scan requester went away before results arrived");
            }
        }))?;
        Ok(rx)
    }
}

fn forward_result(
    tx: oneshot::Sender<Result<(), ThreadError>>,
    what: &'static str,
) -> ResultHandler {
    Box::new(move |res| {
        if tx.send(res).is_err() {
            log::warn!("{what} requester went away before the result arrived");
        }
    })
}

#[derive(Message)]
#[rtype(result = "OperationResponse")]
pub struct Attach(pub AttachParams);
type OperationResponse = Result<ResultReceiver, ThreadError>;

impl Handler<Attach> for Agent {
    type Result = OperationResponse;

    fn handle(&mut self, msg: Attach, _ctx: &mut Self::Context) -> Self::Result {
        let (tx, rx) = oneshot::channel();
        self.attach(msg.0, forward_result(tx, "Attach"))?;
        Ok(rx)
    }
}

#[derive(Message)]
#[rtype(result = "OperationResponse")]
pub struct JoinerStart(pub JoinerParams);

impl Handler<JoinerStart> for Agent {
    type Result = OperationResponse;

    fn handle(&mut self, msg: JoinerStart, _ctx: &mut Self::Context) -> Self::Result {
        let (tx, rx) = oneshot::channel();
        self.joiner_start(msg.0, forward_result(tx, "Join"))?;
        Ok(rx)
    }
}

/// Open `port` on the stack for unsecured traffic, for `seconds` (0 keeps
/// it open until the next reset)
#[derive(Message)]
#[rtype(result = "Result<(), OtError>")]
pub struct AddUnsecurePort {
    pub port: u16,
    pub seconds: u32,
}

impl Handler<AddUnsecurePort> for Agent {
    type Result = Result<(), OtError>;

    fn handle(&mut self, msg: AddUnsecurePort, _ctx: &mut Self::Context) -> Self::Result {
        self.add_unsecure_port(msg.port, msg.seconds)
    }
}

#[derive(Message)]
#[rtype(result = "Result<(), OtError>")]
pub struct Reset;

impl Handler<Reset> for Agent {
    type Result = Result<(), OtError>;

    fn handle(&mut self, _msg: Reset, _ctx: &mut Self::Context) -> Self::Result {
        self.reset()
    }
}

#[derive(Message)]
#[rtype(result = "()")]
pub struct AddDeviceRoleHandler(pub DeviceRoleHandler);

impl Handler<AddDeviceRoleHandler> for Agent {
    type Result = ();

    fn handle(&mut self, msg: AddDeviceRoleHandler, _ctx: &mut Self::Context) -> Self::Result {
        self.add_device_role_handler(msg.0)
    }
}
