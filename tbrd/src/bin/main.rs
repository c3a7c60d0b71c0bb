use rand::{rngs::StdRng, SeedableRng};
use tracing_appender::rolling;
use tracing_subscriber::FmtSubscriber;

use actix::Actor;
use tbr_agent::{AddDeviceRoleHandler, Agent, OtCliStack, SmcRouteSink};
use tbrd::{config, pump, TbrdResult};

use tracing_log::LogTracer;

#[actix::main]
async fn main() -> TbrdResult<()> {
    LogTracer::init()?;

    let log = rolling::daily(config::log_dir(), "tbrd");
    let (nb, _guard) = tracing_appender::non_blocking(log);

    let sub = FmtSubscriber::builder()
        .with_max_level(config::log_level()?)
        .with_writer(nb)
        .finish();

    tracing::subscriber::set_global_default(sub)?;

    let thread_if = config::thread_interface();
    let backbone_if = config::backbone_interface();
    log::info!("Thread border router agent on {thread_if}, backbone {backbone_if}");

    let mut agent = Agent::new(
        Box::new(OtCliStack::new(thread_if)),
        Box::new(SmcRouteSink::new(thread_if, backbone_if)),
        Box::new(StdRng::from_entropy()),
    );
    let role = agent.init().map_err(|e| {
        log::error!("Unable to initialize agent {e:}");
        e
    })?;
    log::info!("Starting as {role}");

    let agent = agent.start();
    agent
        .send(AddDeviceRoleHandler(Box::new(|role| {
            log::info!("Thread device role is now {role}");
        })))
        .await?;

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::error!("Unable to listen for shutdown signal {e:}");
            std::future::pending::<()>().await;
        }
    };

    pump::run(
        agent,
        config::poll_interval(),
        config::sweep_interval(),
        shutdown,
    )
    .await
}
