use rand::{Rng, RngCore};
use std::{
    collections::BTreeMap,
    panic::{self, AssertUnwindSafe},
};
use tokio::time::{Duration, Instant};

use crate::{
    stack::{
        ActiveScanResult, ChangedFlags, ChannelMask, Dataset, DeviceRole, ExtPanId, JoinerParams,
        PanId, RadioStack, KEY_SIZE, MAX_NETWORK_NAME_SIZE,
    },
    OtError, ThreadError,
};

/// Passing this as the PAN ID asks for a random one. It is also the
/// broadcast PAN ID, so it is never drawn
pub const PAN_ID_UNSPECIFIED: PanId = 0xffff;

/// Passing this as the extended PAN ID asks for a random one
pub const EXT_PAN_ID_UNSPECIFIED: ExtPanId = u64::MAX;

pub type DeviceRoleHandler = Box<dyn FnMut(DeviceRole) + Send>;
pub type ScanHandler = Box<dyn FnOnce(Result<Vec<ActiveScanResult>, OtError>) + Send>;
pub type ResultHandler = Box<dyn FnOnce(Result<(), ThreadError>) + Send>;

/// Parameters for [`ThreadHelper::attach`]. Unspecified values are
/// filled in at random
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachParams {
    pub network_name: String,
    /// [`PAN_ID_UNSPECIFIED`] for random
    pub pan_id: PanId,
    /// [`EXT_PAN_ID_UNSPECIFIED`] for random
    pub ext_pan_id: ExtPanId,
    /// Empty for random
    pub network_key: Vec<u8>,
    /// Empty for random
    pub pskc: Vec<u8>,
    /// One channel is picked at random from the set bits
    pub channel_mask: ChannelMask,
}

/// Attach and join share one slot: only one of them may be outstanding
enum PendingOp {
    Attach(ResultHandler),
    Join(ResultHandler),
}

impl PendingOp {
    fn name(&self) -> &'static str {
        match self {
            PendingOp::Attach(_) => "attach",
            PendingOp::Join(_) => "join",
        }
    }
}

struct ScanSession {
    handler: ScanHandler,
    results: Vec<ActiveScanResult>,
}

/// [`ThreadHelper`] turns the one-shot, callback driven network operations
/// of the stack (active scan, attach, joiner start) into request / result
/// handler pairs, and has the following responsibilities:
/// 1. Enforce that attach and join are mutually exclusive; a second
///    request while one is outstanding fails right away with
///    [`ThreadError::Busy`]
/// 2. Derive any network parameter the caller left unspecified
/// 3. Notify registered handlers of every device role change
/// 4. Track unsecure ports opened with a timeout so they can be closed by
///    [`ThreadHelper::sweep_unsecure_ports`]
pub struct ThreadHelper {
    scan: Option<ScanSession>,
    role_handlers: Vec<DeviceRoleHandler>,
    /// `None` expiry means the port stays open until reset
    unsecure_ports: BTreeMap<u16, Option<Instant>>,
    pending: Option<PendingOp>,
    rng: Box<dyn RngCore + Send>,
}

impl ThreadHelper {
    pub fn new(rng: Box<dyn RngCore + Send>) -> Self {
        Self {
            scan: None,
            role_handlers: vec![],
            unsecure_ports: BTreeMap::new(),
            pending: None,
            rng,
        }
    }

    pub fn init(&mut self, stack: &dyn RadioStack) -> Result<DeviceRole, OtError> {
        let role = stack.device_role().map_err(|e| {
            log::error!("Unable to read device role {e:}");
            e
        })?;
        log::info!("Thread helper initialized, device role is {role}");
        Ok(role)
    }

    pub fn add_device_role_handler(&mut self, handler: DeviceRoleHandler) {
        self.role_handlers.push(handler);
    }

    /// True while an attach or join is outstanding
    pub fn is_busy(&self) -> bool {
        self.pending.is_some()
    }

    pub fn is_scanning(&self) -> bool {
        self.scan.is_some()
    }

    /// Ports currently tracked, with their expiry (if any)
    pub fn unsecure_ports(&self) -> impl Iterator<Item = (u16, Option<Instant>)> + '_ {
        self.unsecure_ports.iter().map(|(p, e)| (*p, *e))
    }

    /// Start an active scan. If one is already running, `handler` replaces
    /// the handler of the running scan and receives its results instead
    pub fn scan(
        &mut self,
        stack: &mut dyn RadioStack,
        handler: ScanHandler,
    ) -> Result<(), OtError> {
        if let Some(session) = self.scan.as_mut() {
            log::debug!("Scan already in progress, replacing its result handler");
            session.handler = handler;
            return Ok(());
        }

        stack.active_scan().map_err(|e| {
            log::error!("Failed to start active scan {e:}");
            e
        })?;

        self.scan = Some(ScanSession {
            handler,
            results: vec![],
        });
        Ok(())
    }

    pub fn attach(
        &mut self,
        stack: &mut dyn RadioStack,
        params: AttachParams,
        handler: ResultHandler,
    ) -> Result<(), ThreadError> {
        if let Some(op) = &self.pending {
            log::warn!("Attach requested while a {} is in progress", op.name());
            return Err(ThreadError::Busy);
        }

        let dataset = self.derive_dataset(params)?;
        log::info!(
            "Attaching to {:?} pan id {:#06x} ext pan id {:016x} channel {}",
            dataset.network_name,
            dataset.pan_id,
            dataset.ext_pan_id,
            dataset.channel
        );

        stack.attach(&dataset).map_err(|e| {
            log::error!("Failed to attach {e:}");
            ThreadError::from(e)
        })?;

        self.pending = Some(PendingOp::Attach(handler));
        Ok(())
    }

    pub fn joiner_start(
        &mut self,
        stack: &mut dyn RadioStack,
        params: JoinerParams,
        handler: ResultHandler,
    ) -> Result<(), ThreadError> {
        if let Some(op) = &self.pending {
            log::warn!("Joiner start requested while a {} is in progress", op.name());
            return Err(ThreadError::Busy);
        }

        stack.joiner_start(&params).map_err(|e| {
            log::error!("Failed to start joiner {e:}");
            ThreadError::from(e)
        })?;

        log::info!("Joiner started, provisioning url {:?}", params.provisioning_url);
        self.pending = Some(PendingOp::Join(handler));
        Ok(())
    }

    /// Reset the stack. Outstanding operations are completed with an abort
    /// since the stack will never report them
    pub fn reset(&mut self, stack: &mut dyn RadioStack) -> Result<(), OtError> {
        stack.reset().map_err(|e| {
            log::error!("Failed to reset stack {e:}");
            e
        })?;
        log::info!("OpenThread stack reset");

        self.unsecure_ports.clear();

        if let Some(session) = self.scan.take() {
            (session.handler)(Err(OtError::Abort));
        }
        match self.pending.take() {
            Some(PendingOp::Attach(handler)) | Some(PendingOp::Join(handler)) => {
                handler(Err(ThreadError::Aborted))
            }
            None => {}
        }
        Ok(())
    }

    /// Open an unsecure port, closing it again after `seconds` (0 for never)
    pub fn add_unsecure_port(
        &mut self,
        stack: &mut dyn RadioStack,
        port: u16,
        seconds: u32,
    ) -> Result<(), OtError> {
        stack.add_unsecure_port(port).map_err(|e| {
            log::error!("Failed to add unsecure port {port} {e:}");
            e
        })?;

        let expiry = (seconds > 0).then(|| Instant::now() + Duration::from_secs(seconds.into()));
        log::debug!("Unsecure port {port} open, timeout {seconds}s");
        self.unsecure_ports.insert(port, expiry);
        Ok(())
    }

    /// Close every unsecure port whose timeout has elapsed
    pub fn sweep_unsecure_ports(&mut self, stack: &mut dyn RadioStack) {
        let now = Instant::now();
        let expired = self
            .unsecure_ports
            .iter()
            .filter_map(|(port, expiry)| match expiry {
                Some(at) if *at <= now => Some(*port),
                _ => None,
            })
            .collect::<Vec<_>>();

        for port in expired {
            self.unsecure_ports.remove(&port);
            match stack.remove_unsecure_port(port) {
                Ok(()) => log::info!("Unsecure port {port} expired, closed"),
                Err(e) => log::error!("Failed to close expired unsecure port {port} {e:}"),
            }
        }
    }

    pub(crate) fn handle_state_changed(&mut self, stack: &dyn RadioStack, flags: ChangedFlags) {
        if !flags.contains(ChangedFlags::THREAD_ROLE) {
            return;
        }

        let role = match stack.device_role() {
            Ok(role) => role,
            Err(e) => {
                log::error!("Role changed but unable to read it {e:}");
                return;
            }
        };
        log::info!("Device role changed to {role}");

        for (idx, handler) in self.role_handlers.iter_mut().enumerate() {
            if panic::catch_unwind(AssertUnwindSafe(|| handler(role))).is_err() {
                log::error!("Device role handler {idx} panicked, continuing");
            }
        }

        if role.is_attached() && matches!(self.pending, Some(PendingOp::Attach(_))) {
            if let Some(PendingOp::Attach(handler)) = self.pending.take() {
                log::info!("Attached to Thread network as {role}");
                handler(Ok(()));
            }
        }
    }

    pub(crate) fn handle_attach_failed(&mut self, error: OtError) {
        if matches!(self.pending, Some(PendingOp::Attach(_))) {
            if let Some(PendingOp::Attach(handler)) = self.pending.take() {
                log::warn!("Failed to attach to Thread network {error:}");
                handler(Err(ThreadError::from(error)));
            }
        } else {
            log::warn!("Attach failure {error:} reported with no attach in progress");
        }
    }

    pub(crate) fn handle_joiner_complete(
        &mut self,
        stack: &mut dyn RadioStack,
        result: Result<(), OtError>,
    ) {
        let handler = match self.pending.take() {
            Some(PendingOp::Join(handler)) => handler,
            other => {
                self.pending = other;
                log::warn!("Joiner completion {result:?} with no join in progress");
                return;
            }
        };

        let result = result
            .and_then(|()| {
                log::info!("Joined Thread network, starting Thread");
                stack.thread_set_enabled(true)
            })
            .map_err(|e| {
                log::warn!("Failed to join Thread network {e:}");
                ThreadError::from(e)
            });
        handler(result);
    }

    pub(crate) fn handle_scan_result(&mut self, result: ActiveScanResult) {
        match self.scan.as_mut() {
            Some(session) => {
                log::trace!(
                    "Scan result {:?} from {}",
                    result.network_name,
                    hex::encode(result.ext_address)
                );
                session.results.push(result);
            }
            None => log::warn!(
                "Dropping scan result from {}, no scan in progress",
                hex::encode(result.ext_address)
            ),
        }
    }

    pub(crate) fn handle_scan_done(&mut self, status: Result<(), OtError>) {
        let Some(ScanSession { handler, results }) = self.scan.take() else {
            log::warn!("Scan completion {status:?} with no scan in progress");
            return;
        };
        log::info!("Scan finished with {} result(s)", results.len());
        handler(status.map(|()| results));
    }

    fn derive_dataset(&mut self, params: AttachParams) -> Result<Dataset, ThreadError> {
        if params.network_name.len() > MAX_NETWORK_NAME_SIZE {
            return Err(ThreadError::InvalidArgs(format!(
                "network name longer than {MAX_NETWORK_NAME_SIZE} bytes"
            )));
        }
        if params.channel_mask == 0 {
            return Err(ThreadError::InvalidArgs("empty channel mask".to_string()));
        }
        for (what, key) in [("network key", &params.network_key), ("PSKc", &params.pskc)] {
            if !key.is_empty() && key.len() != KEY_SIZE {
                return Err(ThreadError::InvalidArgs(format!(
                    "{what} must be {KEY_SIZE} bytes, got {}",
                    key.len()
                )));
            }
        }

        let pan_id = if params.pan_id == PAN_ID_UNSPECIFIED {
            self.rng.gen_range(0..PAN_ID_UNSPECIFIED)
        } else {
            params.pan_id
        };
        let ext_pan_id = if params.ext_pan_id == EXT_PAN_ID_UNSPECIFIED {
            self.rng.gen_range(0..EXT_PAN_ID_UNSPECIFIED)
        } else {
            params.ext_pan_id
        };
        let network_key = self.key_or_random(&params.network_key);
        let pskc = self.key_or_random(&params.pskc);
        let channel = self.random_channel(params.channel_mask)?;

        Ok(Dataset {
            network_name: params.network_name,
            pan_id,
            ext_pan_id,
            network_key,
            pskc,
            channel,
        })
    }

    /// Length was already checked by the caller
    fn key_or_random(&mut self, key: &[u8]) -> [u8; KEY_SIZE] {
        let mut out = [0u8; KEY_SIZE];
        if key.is_empty() {
            self.rng.fill_bytes(&mut out);
        } else {
            out.copy_from_slice(key);
        }
        out
    }

    fn random_channel(&mut self, mask: ChannelMask) -> Result<u8, ThreadError> {
        let channels = (0..ChannelMask::BITS as u8)
            .filter(|c| mask & (1 << c) != 0)
            .collect::<Vec<_>>();
        match channels.as_slice() {
            [] => Err(ThreadError::InvalidArgs("empty channel mask".to_string())),
            [only] => Ok(*only),
            _ => Ok(channels[self.rng.gen_range(0..channels.len())]),
        }
    }
}
