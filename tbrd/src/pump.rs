use actix::Addr;
use std::future::Future;
use tokio::time::{interval, Duration, MissedTickBehavior};

use tbr_agent::{Agent, Process, SweepUnsecurePorts};

use crate::TbrdResult;

/// Drive `agent` until `shutdown` resolves: deliver stack events every
/// `poll` and close expired unsecure ports every `sweep`
pub async fn run(
    agent: Addr<Agent>,
    poll: Duration,
    sweep: Duration,
    shutdown: impl Future<Output = ()>,
) -> TbrdResult<()> {
    let mut poll_tick = interval(poll);
    poll_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut sweep_tick = interval(sweep);
    sweep_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

    tokio::pin!(shutdown);
    log::info!("Event pump running, poll {poll:?} sweep {sweep:?}");

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                log::info!("Event pump shutting down");
                break;
            }
            _ = poll_tick.tick() => {
                let count = agent.send(Process).await.map_err(|e| {
                    log::error!("Agent unreachable {e:}");
                    e
                })?;
                if count > 0 {
                    log::debug!("Dispatched {count} stack event(s)");
                }
            }
            _ = sweep_tick.tick() => {
                agent.send(SweepUnsecurePorts).await.map_err(|e| {
                    log::error!("Agent unreachable {e:}");
                    e
                })?;
            }
        }
    }
    Ok(())
}
