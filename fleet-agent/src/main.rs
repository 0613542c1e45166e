use std::sync::Arc;

use fleet_agent::config::AgentConfig;
use fleet_agent::dispatcher::{
    ActionDispatcher, ChannelPolicyEmitter, PolicyChangeHandler, UnknownActionHandler,
};
use fleet_agent::gateway::FleetGateway;
use fleet_agent::logging;
use fleet_agent::reporter::QueueReporter;
use fleet_api::{
    ActionKind, CheckinCmd, ClientSettings, Event, EventSubType, HttpClient, StaticAgentInfo,
};
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AgentConfig::from_env()?;
    logging::init_logging(&config.log_filter)?;

    info!(
        "Starting fleet agent {} against {}",
        config.agent_id, config.fleet_url
    );

    let client = HttpClient::new(ClientSettings {
        url: config.fleet_url.clone(),
        api_key: config.api_key.clone(),
        timeout: config.request_timeout,
    })?;
    let checkin = CheckinCmd::new(Arc::new(client));

    let reporter = QueueReporter::new(config.queue_threshold);

    let (emitter, mut policies) = ChannelPolicyEmitter::channel(16);
    let mut dispatcher = ActionDispatcher::new(Arc::new(UnknownActionHandler));
    dispatcher.register(
        ActionKind::PolicyChange,
        Arc::new(PolicyChangeHandler::new(Arc::new(emitter))),
    )?;

    let policy_task = tokio::spawn(async move {
        while let Some(update) = policies.recv().await {
            info!(
                "Received policy from action {} with {} top-level keys",
                update.action_id,
                update.policy.len()
            );
        }
    });

    let gateway = FleetGateway::new(
        &config.gateway,
        Arc::new(StaticAgentInfo::new(config.agent_id.clone())),
        Arc::new(checkin),
        Arc::new(dispatcher),
        Arc::new(reporter.clone()),
    )?;

    gateway.start()?;
    let mut payload = serde_json::Map::new();
    payload.insert("agent_id".to_string(), config.agent_id.clone().into());
    payload.insert("version".to_string(), env!("CARGO_PKG_VERSION").into());
    reporter.report(Event::state(EventSubType::Starting, "agent starting").with_payload(payload));

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");

    reporter.report(Event::state(EventSubType::Stopping, "agent stopping"));
    gateway.stop();
    gateway.wait_stopped().await;

    // Best effort delivery of the events reported since the last check-in.
    if let Err(e) = gateway.execute().await {
        error!("Final check-in failed: {}", e);
    }

    let stats = gateway.stats();
    info!(
        "Fleet agent stopped after {} successful and {} failed check-ins, {} events pending",
        stats.checkins_succeeded,
        stats.checkins_failed,
        reporter.len()
    );

    drop(gateway);
    policy_task.abort();
    Ok(())
}
