use std::{net::Ipv6Addr, process::Command};

use crate::backbone::{MulticastRouteSink, SinkError};

/// [`MulticastRouteSink`] backed by a running smcrouted, programmed via
/// smcroutectl. Groups are joined on the backbone interface and routed
/// from the backbone into the Thread interface
pub struct SmcRouteSink {
    thread_interface: String,
    backbone_interface: String,
}

impl SmcRouteSink {
    pub fn new(thread_interface: &str, backbone_interface: &str) -> Self {
        Self {
            thread_interface: thread_interface.to_string(),
            backbone_interface: backbone_interface.to_string(),
        }
    }

    fn join_commands(&self, group: Ipv6Addr) -> [Vec<String>; 2] {
        let group = group.to_string();
        [
            vec![
                "join".to_string(),
                self.backbone_interface.clone(),
                group.clone(),
            ],
            vec![
                "add".to_string(),
                self.backbone_interface.clone(),
                group,
                self.thread_interface.clone(),
            ],
        ]
    }

    /// Reverse of [`SmcRouteSink::join_commands`]
    fn leave_commands(&self, group: Ipv6Addr) -> [Vec<String>; 2] {
        let group = group.to_string();
        [
            vec![
                "remove".to_string(),
                self.backbone_interface.clone(),
                group.clone(),
                self.thread_interface.clone(),
            ],
            vec!["leave".to_string(), self.backbone_interface.clone(), group],
        ]
    }

    fn exec(&self, args: &[String]) -> Result<(), SinkError> {
        log::debug!("smcroutectl {}", args.join(" "));
        let resp = Command::new("smcroutectl").args(args).output()?;

        if resp.status.success() {
            Ok(())
        } else {
            Err(SinkError::Command(format!(
                "smcroutectl {}: exit status {:?} {}",
                args.join(" "),
                resp.status,
                std::str::from_utf8(&resp.stderr)?.trim()
            )))
        }
    }

    /// Run every command even if an earlier one failed, reporting the first
    /// failure
    fn exec_all(&self, cmds: &[Vec<String>]) -> Result<(), SinkError> {
        cmds.iter()
            .map(|cmd| self.exec(cmd))
            .fold(Ok(()), |acc, res| acc.and(res))
    }

    fn flush(&self) -> Result<(), SinkError> {
        self.exec(&["flush".to_string()])
    }
}

impl MulticastRouteSink for SmcRouteSink {
    fn backbone_up(&mut self) -> Result<(), SinkError> {
        log::info!(
            "Multicast forwarding {} -> {} up",
            self.backbone_interface,
            self.thread_interface
        );
        self.flush()
    }

    fn backbone_down(&mut self) -> Result<(), SinkError> {
        log::info!(
            "Multicast forwarding {} -> {} down",
            self.backbone_interface,
            self.thread_interface
        );
        self.flush()
    }

    fn join_group(&mut self, group: Ipv6Addr) -> Result<(), SinkError> {
        self.exec_all(&self.join_commands(group))
    }

    fn leave_group(&mut self, group: Ipv6Addr) -> Result<(), SinkError> {
        self.exec_all(&self.leave_commands(group))
    }
}
