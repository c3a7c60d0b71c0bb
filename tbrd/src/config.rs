use tokio::time::Duration;

use crate::TbrdError;

/// Read from the `[tbrd]` section of `cfg.toml` at build time
#[toml_cfg::toml_config]
pub struct Config {
    #[default("wpan0")]
    thread_interface: &'static str,
    #[default("eth0")]
    backbone_interface: &'static str,
    #[default("./logs")]
    log_dir: &'static str,
    #[default("info")]
    log_level: &'static str,
    #[default(100)]
    poll_interval_ms: u64,
    #[default(1)]
    sweep_interval_s: u64,
}

pub fn thread_interface() -> &'static str {
    CONFIG.thread_interface
}

pub fn backbone_interface() -> &'static str {
    CONFIG.backbone_interface
}

pub fn log_dir() -> &'static str {
    CONFIG.log_dir
}

pub fn log_level() -> Result<tracing::Level, TbrdError> {
    parse_level(CONFIG.log_level)
}

pub fn poll_interval() -> Duration {
    Duration::from_millis(CONFIG.poll_interval_ms.max(1))
}

pub fn sweep_interval() -> Duration {
    Duration::from_secs(CONFIG.sweep_interval_s.max(1))
}

fn parse_level(level: &str) -> Result<tracing::Level, TbrdError> {
    level.parse().map_err(|e| {
        log::error!("Bad log level {level:?} {e:}");
        TbrdError::Config(format!("log level {level:?}"))
    })
}
