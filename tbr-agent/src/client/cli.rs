//! Implementation of the [`RadioStack`] trait on top of a running
//! otbr-agent, driven through the ot-ctl CLI process. The CLI has no
//! notification channel, so [`RadioStack::process`] polls the values the
//! agent reacts to and reports differences as events
use std::{
    collections::{BTreeMap, BTreeSet},
    fmt::Display,
    net::Ipv6Addr,
    process::Command,
    str::FromStr,
};
use tokio::time::{Duration, Instant};

use crate::{
    client::OtClientError,
    stack::{
        ActiveScanResult, BackboneRouterConfig, BackboneRouterState, ChangedFlags, Dataset,
        DeviceRole, JoinerParams, MulticastListenerEvent, RadioStack, StackEvent,
    },
    OtError,
};

/// An attach that has not reached an attached role by then is reported as
/// timed out
const ATTACH_TIMEOUT: Duration = Duration::from_secs(120);

pub struct OtCliStack {
    interface: String,
    /// Last polled values, `None` until first seen
    role: Option<DeviceRole>,
    bbr_state: Option<BackboneRouterState>,
    bbr_config: Option<BackboneRouterConfig>,
    listeners: BTreeSet<Ipv6Addr>,
    scan_requested: bool,
    joining: bool,
    attach_deadline: Option<Instant>,
    /// Last failure of each polled command, so a persistent one is only
    /// logged as an error once
    poll_failures: BTreeMap<String, OtError>,
}

impl OtCliStack {
    pub fn new(interface: &str) -> Self {
        Self {
            interface: interface.to_string(),
            role: None,
            bbr_state: None,
            bbr_config: None,
            listeners: BTreeSet::new(),
            scan_requested: false,
            joining: false,
            attach_deadline: None,
            poll_failures: BTreeMap::new(),
        }
    }

    fn exec<S: AsRef<str>>(&self, args: &[S]) -> Result<String, OtClientError> {
        let resp = Command::new("ot-ctl")
            .arg("-I")
            .arg(&self.interface)
            .args(args.iter().map(|a| a.as_ref()))
            .output()?;

        if resp.status.success() {
            Ok(OtCliStack::parse_response(std::str::from_utf8(&resp.stdout)?)?)
        } else {
            Err(OtClientError::OtClientErr(format!(
                "Failed CLI Command: exit status {:?}",
                resp.status
            )))
        }
    }

    fn command<S: AsRef<str>>(&self, args: &[S]) -> Result<String, OtError> {
        self.exec(args).map_err(|e| {
            let cmd = args.iter().map(|a| a.as_ref()).collect::<Vec<_>>();
            log::error!("ot-ctl {} failed {e:}", cmd.join(" "));
            OtError::from(e)
        })
    }

    /// [`OtCliStack::command`] for commands issued on every poll
    fn poll_command(&mut self, args: &[&str]) -> Result<String, OtError> {
        let res = self.exec(args).map_err(OtError::from);
        self.note_poll_result(&args.join(" "), &res);
        res
    }

    fn poll_parse<T: FromStr<Err = OtError>>(&mut self, args: &[&str]) -> Result<T, OtError> {
        self.poll_command(args)?.parse()
    }

    /// Returns true if `res` is a failure of `cmd` that differs from the one
    /// seen on the previous poll. Only those are logged as errors
    fn note_poll_result(&mut self, cmd: &str, res: &Result<String, OtError>) -> bool {
        match res {
            Ok(_) => {
                if self.poll_failures.remove(cmd).is_some() {
                    log::info!("ot-ctl {cmd} recovered");
                }
                false
            }
            Err(e) if self.poll_failures.get(cmd) == Some(e) => {
                log::debug!("ot-ctl {cmd} still failing {e:}");
                false
            }
            Err(e) => {
                log::error!("ot-ctl {cmd} failed {e:}");
                self.poll_failures.insert(cmd.to_string(), e.clone());
                true
            }
        }
    }

    /// Output up to the trailing `Done`, or the stack error it reported
    fn parse_response(res: &str) -> Result<String, OtError> {
        let mut body = vec![];
        for line in res.lines().map(str::trim) {
            if line == "Done" {
                break;
            }
            if let Some(rem) = line.strip_prefix("Error ") {
                let code = rem.split(':').next().and_then(|c| c.trim().parse::<u8>().ok());
                return Err(match code {
                    Some(code) => OtError::from_code(code),
                    None => OtError::Adapter(line.to_string()),
                });
            }
            body.push(line);
        }
        Ok(body.join("\n"))
    }

    fn parse_bbr_config(res: &str) -> Result<BackboneRouterConfig, OtError> {
        let mut config = BackboneRouterConfig::default();
        let mut found = 0;

        for line in res.lines() {
            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            // Values may carry a unit, e.g. "120 secs"
            let value = value.split_whitespace().next().unwrap_or_default();
            match key.trim() {
                "seqno" => config.sequence_number = value.parse().map_err(|e| bad(line, e))?,
                "delay" => config.reregistration_delay = value.parse().map_err(|e| bad(line, e))?,
                "timeout" => config.mlr_timeout = value.parse().map_err(|e| bad(line, e))?,
                _ => continue,
            }
            found += 1;
        }

        if found == 3 {
            Ok(config)
        } else {
            Err(OtError::Adapter(format!("Incomplete bbr config {res:?}")))
        }
    }

    /// One listener per line, address first
    fn parse_listeners(res: &str) -> Vec<Ipv6Addr> {
        res.lines()
            .filter_map(|l| l.split_whitespace().next())
            .filter_map(|a| a.parse::<Ipv6Addr>().ok())
            .collect()
    }

    /// Rows of the `scan` table:
    /// `| J | Network Name | Extended PAN | PAN | MAC Address | Ch | dBm | LQI |`
    fn parse_scan_table(res: &str) -> Vec<ActiveScanResult> {
        res.lines()
            .map(str::trim)
            .filter(|l| l.starts_with('|'))
            .filter_map(|l| {
                let cells = l
                    .trim_matches('|')
                    .split('|')
                    .map(str::trim)
                    .collect::<Vec<_>>();
                if cells.len() != 8 || cells[0] == "J" {
                    return None;
                }
                OtCliStack::parse_scan_row(&cells)
                    .map_err(|e| {
                        log::warn!("Skipping scan row {l:?} {e:}");
                        e
                    })
                    .ok()
            })
            .collect()
    }

    fn parse_scan_row(cells: &[&str]) -> Result<ActiveScanResult, OtError> {
        let row = cells.join("|");
        let mut ext_address = [0u8; 8];
        hex::decode_to_slice(cells[4], &mut ext_address).map_err(|e| bad(&row, e))?;

        Ok(ActiveScanResult {
            ext_address,
            network_name: cells[1].to_string(),
            ext_pan_id: u64::from_str_radix(cells[2], 16).map_err(|e| bad(&row, e))?,
            pan_id: u16::from_str_radix(cells[3], 16).map_err(|e| bad(&row, e))?,
            channel: cells[5].parse().map_err(|e| bad(&row, e))?,
            rssi: cells[6].parse().map_err(|e| bad(&row, e))?,
            lqi: cells[7].parse().map_err(|e| bad(&row, e))?,
            is_joinable: cells[0] == "1",
        })
    }

    /// Commands that commit `dataset` as the active dataset and bring
    /// Thread up on it
    fn attach_commands(dataset: &Dataset) -> Vec<Vec<String>> {
        let dataset_cmd = |field: &str, value: String| {
            vec!["dataset".to_string(), field.to_string(), value]
        };
        vec![
            vec!["dataset".to_string(), "clear".to_string()],
            dataset_cmd("networkname", dataset.network_name.clone()),
            dataset_cmd("panid", format!("{:#06x}", dataset.pan_id)),
            dataset_cmd("extpanid", format!("{:016x}", dataset.ext_pan_id)),
            dataset_cmd("networkkey", hex::encode(dataset.network_key)),
            dataset_cmd("pskc", hex::encode(dataset.pskc)),
            dataset_cmd("channel", dataset.channel.to_string()),
            dataset_cmd("commit", "active".to_string()),
            vec!["ifconfig".to_string(), "up".to_string()],
            vec!["thread".to_string(), "start".to_string()],
        ]
    }

    fn listener_events(
        previous: &BTreeSet<Ipv6Addr>,
        current: &BTreeSet<Ipv6Addr>,
    ) -> Vec<StackEvent> {
        let added = current
            .difference(previous)
            .map(|a| (MulticastListenerEvent::Added, *a));
        let removed = previous
            .difference(current)
            .map(|a| (MulticastListenerEvent::Removed, *a));
        added
            .chain(removed)
            .map(|(event, address)| StackEvent::MulticastListener { event, address })
            .collect()
    }

    fn poll_scan(&mut self, events: &mut Vec<StackEvent>) {
        if !std::mem::take(&mut self.scan_requested) {
            return;
        }
        // ot-ctl blocks until the scan is over
        match self.command(&["scan"]) {
            Ok(table) => {
                events.extend(
                    OtCliStack::parse_scan_table(&table)
                        .into_iter()
                        .map(StackEvent::ScanResult),
                );
                events.push(StackEvent::ScanDone(Ok(())));
            }
            Err(e) => events.push(StackEvent::ScanDone(Err(e))),
        }
    }

    fn poll_state(&mut self) -> ChangedFlags {
        let mut flags = ChangedFlags::empty();

        if let Ok(role) = self.poll_parse::<DeviceRole>(&["state"]) {
            if self.role.replace(role) != Some(role) {
                flags |= ChangedFlags::THREAD_ROLE;
            }
        }
        if let Ok(state) = self.poll_parse::<BackboneRouterState>(&["bbr", "state"]) {
            if self.bbr_state.replace(state) != Some(state) {
                flags |= ChangedFlags::BACKBONE_ROUTER_STATE;
            }
        }
        let config = self
            .poll_command(&["bbr", "config"])
            .and_then(|r| OtCliStack::parse_bbr_config(&r));
        if let Ok(config) = config {
            // The first reading is only a baseline
            if self.bbr_config.replace(config).is_some_and(|prev| prev != config) {
                flags |= ChangedFlags::BACKBONE_ROUTER_LOCAL;
            }
        }
        flags
    }

    fn poll_attach(&mut self, events: &mut Vec<StackEvent>) {
        let Some(deadline) = self.attach_deadline else {
            return;
        };
        if self.role.is_some_and(|r| r.is_attached()) {
            self.attach_deadline = None;
        } else if Instant::now() >= deadline {
            log::warn!("No attached role within {ATTACH_TIMEOUT:?}");
            self.attach_deadline = None;
            events.push(StackEvent::AttachFailed(OtError::ResponseTimeout));
        }
    }

    fn poll_joiner(&mut self, events: &mut Vec<StackEvent>) {
        if !self.joining {
            return;
        }
        let Ok(state) = self.poll_command(&["joiner", "state"]) else {
            return;
        };
        let result = match state.trim() {
            "Joined" => Ok(()),
            // Joiner gave up without joining
            "Idle" => Err(OtError::Failed),
            _ => return,
        };
        self.joining = false;
        events.push(StackEvent::JoinerComplete(result));
    }

    fn poll_listeners(&mut self, flags: ChangedFlags, events: &mut Vec<StackEvent>) {
        if self.bbr_state != Some(BackboneRouterState::Primary) {
            self.listeners.clear();
            return;
        }
        let Ok(res) = self.poll_command(&["bbr", "mgmt", "mlr", "listener"]) else {
            return;
        };
        let current = OtCliStack::parse_listeners(&res)
            .into_iter()
            .collect::<BTreeSet<_>>();

        // A new Primary reads the full table itself
        if !flags.contains(ChangedFlags::BACKBONE_ROUTER_STATE) {
            events.extend(OtCliStack::listener_events(&self.listeners, &current));
        }
        self.listeners = current;
    }
}

fn bad<E: Display>(what: &str, e: E) -> OtError {
    OtError::Adapter(format!("Unable to parse {what:?} {e}"))
}

impl RadioStack for OtCliStack {
    fn process(&mut self) -> Vec<StackEvent> {
        let mut events = vec![];

        self.poll_scan(&mut events);

        let flags = self.poll_state();
        if !flags.is_empty() {
            events.push(StackEvent::StateChanged(flags));
        }

        self.poll_attach(&mut events);
        self.poll_joiner(&mut events);
        self.poll_listeners(flags, &mut events);
        events
    }

    fn active_scan(&mut self) -> Result<(), OtError> {
        self.scan_requested = true;
        Ok(())
    }

    fn attach(&mut self, dataset: &Dataset) -> Result<(), OtError> {
        for cmd in OtCliStack::attach_commands(dataset) {
            self.command(&cmd)?;
        }
        // Report whatever role comes next, even if it is the current one
        self.role = None;
        self.attach_deadline = Some(Instant::now() + ATTACH_TIMEOUT);
        Ok(())
    }

    fn joiner_start(&mut self, params: &JoinerParams) -> Result<(), OtError> {
        if !params.vendor_name.is_empty() || !params.vendor_data.is_empty() {
            log::debug!("Vendor info not settable over ot-ctl, using the stack's");
        }
        self.command(&["ifconfig", "up"])?;

        let mut cmd = vec!["joiner", "start", params.pskd.as_str()];
        if !params.provisioning_url.is_empty() {
            cmd.push(params.provisioning_url.as_str());
        }
        self.command(&cmd)?;
        self.joining = true;
        Ok(())
    }

    fn thread_set_enabled(&mut self, enabled: bool) -> Result<(), OtError> {
        let action = if enabled { "start" } else { "stop" };
        self.command(&["thread", action]).map(|_| ())
    }

    fn add_unsecure_port(&mut self, port: u16) -> Result<(), OtError> {
        let port = port.to_string();
        self.command(&["unsecureport", "add", &port]).map(|_| ())
    }

    fn remove_unsecure_port(&mut self, port: u16) -> Result<(), OtError> {
        let port = port.to_string();
        self.command(&["unsecureport", "remove", &port]).map(|_| ())
    }

    fn reset(&mut self) -> Result<(), OtError> {
        self.command(&["reset"])?;
        *self = OtCliStack::new(&self.interface);
        Ok(())
    }

    fn device_role(&self) -> Result<DeviceRole, OtError> {
        self.command(&["state"])?.parse()
    }

    fn backbone_router_state(&self) -> Result<BackboneRouterState, OtError> {
        self.command(&["bbr", "state"])?.parse()
    }

    fn backbone_router_config(&self) -> Result<BackboneRouterConfig, OtError> {
        OtCliStack::parse_bbr_config(&self.command(&["bbr", "config"])?)
    }

    fn set_backbone_router_config(
        &mut self,
        config: &BackboneRouterConfig,
    ) -> Result<(), OtError> {
        self.command(&[
            "bbr".to_string(),
            "config".to_string(),
            "seqno".to_string(),
            config.sequence_number.to_string(),
            "delay".to_string(),
            config.reregistration_delay.to_string(),
            "timeout".to_string(),
            config.mlr_timeout.to_string(),
        ])?;
        self.bbr_config = Some(*config);
        Ok(())
    }

    fn multicast_listeners(&self) -> Result<Vec<Ipv6Addr>, OtError> {
        let res = self.command(&["bbr", "mgmt", "mlr", "listener"])?;
        Ok(OtCliStack::parse_listeners(&res))
    }
}
