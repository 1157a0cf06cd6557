// MIT License - Copyright (c) 2026 dsc-keybus-bridge contributors
// MQTT bridge

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use serde::Deserialize;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::Notify;
use tokio::time::Duration;
use tracing::{debug, error, info, warn};

use dsc_keybus_bridge::constants::{
    DEFAULT_AUTO_RESTART_SECS, DEFAULT_POLL_INTERVAL_MS, DEFAULT_WRITE_POLL_INTERVAL_MS,
    DEFAULT_WRITE_TIMEOUT_MS, MAX_PARTITIONS, MAX_ZONE_GROUPS,
};
use dsc_keybus_bridge::protocol::{command_property, parse_command};
use dsc_keybus_bridge::{
    BridgeConfig, CommandOutcome, DscError, InboundCommand, KeybusPanel, LightsFormat, Lights,
    LoopbackDriver, MaintenanceAction, PanelEvent, PartitionStatus, StatusBoard,
};

type Panel = KeybusPanel<LoopbackDriver>;

// ---------------------------------------------------------------------------
// CLI
// ---------------------------------------------------------------------------

#[derive(Parser)]
#[command(name = "dsc2mqtt")]
#[command(about = "Bridge between a DSC Keybus alarm panel and MQTT")]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(long, default_value = "config.toml")]
    config: String,
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct Config {
    #[serde(default)]
    keybus: KeybusToml,
    mqtt: MqttToml,
}

#[derive(Debug, Deserialize)]
struct KeybusToml {
    #[serde(default = "default_partition_count")]
    partition_count: u8,
    #[serde(default = "default_zone_group_count")]
    zone_group_count: u8,
    #[serde(default = "default_access_code")]
    access_code: String,
    #[serde(default = "default_poll_interval")]
    poll_interval_ms: u64,
    #[serde(default = "default_write_timeout")]
    write_timeout_ms: u64,
    #[serde(default = "default_write_poll_interval")]
    write_poll_interval_ms: u64,
    #[serde(default = "default_auto_restart")]
    auto_restart_secs: u64,
    #[serde(default)]
    mask_access_code: bool,
    /// "raw" (number) or "json" (object of named lights)
    #[serde(default = "default_lights_format")]
    lights_format: String,
    /// Let the in-process driver react to writes like a real panel
    #[serde(default)]
    emulate_panel: bool,
}

impl Default for KeybusToml {
    fn default() -> Self {
        Self {
            partition_count: default_partition_count(),
            zone_group_count: default_zone_group_count(),
            access_code: default_access_code(),
            poll_interval_ms: default_poll_interval(),
            write_timeout_ms: default_write_timeout(),
            write_poll_interval_ms: default_write_poll_interval(),
            auto_restart_secs: default_auto_restart(),
            mask_access_code: false,
            lights_format: default_lights_format(),
            emulate_panel: false,
        }
    }
}

fn default_partition_count() -> u8 {
    MAX_PARTITIONS as u8
}
fn default_zone_group_count() -> u8 {
    MAX_ZONE_GROUPS as u8
}
fn default_access_code() -> String {
    "1234".to_string()
}
fn default_poll_interval() -> u64 {
    DEFAULT_POLL_INTERVAL_MS
}
fn default_write_timeout() -> u64 {
    DEFAULT_WRITE_TIMEOUT_MS
}
fn default_write_poll_interval() -> u64 {
    DEFAULT_WRITE_POLL_INTERVAL_MS
}
fn default_auto_restart() -> u64 {
    DEFAULT_AUTO_RESTART_SECS
}
fn default_lights_format() -> String {
    "raw".to_string()
}

#[derive(Debug, Deserialize)]
struct MqttToml {
    url: String,
    #[serde(default = "default_client_id")]
    client_id: String,
    #[serde(default = "default_base_topic")]
    base_topic: String,
}

fn default_client_id() -> String {
    "dsc-bridge".to_string()
}
fn default_base_topic() -> String {
    "dsc".to_string()
}

fn build_bridge_config(toml: &KeybusToml) -> Result<BridgeConfig> {
    let lights_format = LightsFormat::from_name(&toml.lights_format)
        .with_context(|| format!("Unknown lights_format: {}", toml.lights_format))?;
    let config = BridgeConfig::builder()
        .partition_count(toml.partition_count)
        .zone_group_count(toml.zone_group_count)
        .access_code(&toml.access_code)
        .poll_interval_ms(toml.poll_interval_ms)
        .write_timeout_ms(toml.write_timeout_ms)
        .write_poll_interval_ms(toml.write_poll_interval_ms)
        .auto_restart_secs(toml.auto_restart_secs)
        .mask_access_code(toml.mask_access_code)
        .lights_format(lights_format)
        .build();
    config.validate()?;
    Ok(config)
}

fn load_config(path: &str) -> Result<(Config, BridgeConfig)> {
    let text = std::fs::read_to_string(path).context("Failed to read config file")?;
    let config: Config = toml::from_str(&text).context("Failed to parse config file")?;
    let bridge = build_bridge_config(&config.keybus).context("Invalid [keybus] config")?;
    Ok((config, bridge))
}

// ---------------------------------------------------------------------------
// Topics
// ---------------------------------------------------------------------------

/// Topic layout under `{base_topic}/alarm`.
#[derive(Debug, Clone)]
struct Topics {
    prefix: String,
}

impl Topics {
    fn new(base_topic: &str) -> Self {
        Self {
            prefix: format!("{}/alarm", base_topic.trim_end_matches('/')),
        }
    }

    fn property(&self, name: &str) -> String {
        format!("{}/{}", self.prefix, name)
    }

    fn partition(&self, partition: u8, field: &str) -> String {
        format!("{}/partition-{}-{}", self.prefix, partition, field)
    }

    fn command_filter(&self) -> String {
        format!("{}/+/set", self.prefix)
    }

    fn message(&self) -> String {
        self.property("message")
    }

    fn maintenance(&self) -> String {
        self.property("maintenance")
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Options that change how events are rendered.
#[derive(Debug, Clone, Copy)]
struct Rendering {
    lights_format: LightsFormat,
    mask_access_code: bool,
}

/// One MQTT message ready to send.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Publication {
    topic: String,
    payload: String,
    retain: bool,
}

impl Publication {
    /// Retained value the broker hands to late subscribers.
    fn state(topic: String, payload: impl Into<String>) -> Self {
        Self { topic, payload: payload.into(), retain: true }
    }

    /// Momentary notification.
    fn pulse(topic: String, payload: impl Into<String>) -> Self {
        Self { topic, payload: payload.into(), retain: false }
    }
}

fn bool_payload(value: bool) -> &'static str {
    if value { "true" } else { "false" }
}

async fn publish(client: &AsyncClient, publication: Publication) {
    let Publication { topic, payload, retain } = publication;
    if let Err(e) = client.publish(&topic, QoS::AtLeastOnce, retain, payload).await {
        error!("Failed to publish to {topic}: {e}");
    }
}

async fn publish_message(client: &AsyncClient, topics: &Topics, text: &str) {
    publish(client, Publication::pulse(topics.message(), text)).await;
}

fn lights_json(lights: Lights) -> serde_json::Value {
    let map: serde_json::Map<String, serde_json::Value> = lights
        .named()
        .into_iter()
        .map(|(name, on)| (name.to_string(), serde_json::Value::Bool(on)))
        .collect();
    serde_json::Value::Object(map)
}

// ---------------------------------------------------------------------------
// Panel event → MQTT
// ---------------------------------------------------------------------------

/// Messages published for one panel event.
fn render_event(event: &PanelEvent, topics: &Topics, rendering: Rendering) -> Vec<Publication> {
    match *event {
        PanelEvent::ConnectionChanged { connected } => {
            vec![Publication::state(topics.property("connected"), bool_payload(connected))]
        }
        PanelEvent::BufferOverflow => {
            vec![Publication::pulse(topics.message(), "Keybus buffer overflow")]
        }
        PanelEvent::KeypadStatusChanged { status, active } => {
            vec![Publication::state(topics.property(status.as_str()), bool_payload(active))]
        }
        PanelEvent::KeypadAlarm { alarm } => {
            let topic = topics.property(&format!("{}-alarm-keypad", alarm.as_str()));
            vec![Publication::pulse(topic, "true")]
        }
        PanelEvent::PartitionStatusMessage { partition, code, text } => vec![Publication::state(
            topics.partition(partition, "status-message"),
            PanelEvent::status_message(code, text),
        )],
        PanelEvent::PartitionStatusChanged { partition, status } => vec![
            Publication::state(topics.partition(partition, "status"), status.as_str()),
            Publication::state(
                topics.partition(partition, "exit-delay"),
                bool_payload(status == PartitionStatus::ExitDelay),
            ),
        ],
        PanelEvent::PartitionArmedChanged { partition, armed, stay, away } => vec![
            Publication::state(topics.partition(partition, "away"), bool_payload(armed && away)),
            Publication::state(topics.partition(partition, "stay"), bool_payload(armed && stay)),
        ],
        PanelEvent::PartitionAlarmChanged { partition, active } => {
            vec![Publication::state(topics.partition(partition, "alarm"), bool_payload(active))]
        }
        PanelEvent::PartitionFireChanged { partition, active } => {
            vec![Publication::state(topics.partition(partition, "fire"), bool_payload(active))]
        }
        PanelEvent::PartitionEntryDelayChanged { partition, active } => vec![Publication::state(
            topics.partition(partition, "entry-delay"),
            bool_payload(active),
        )],
        PanelEvent::PartitionLightsChanged { partition, lights } => {
            let payload = match rendering.lights_format {
                LightsFormat::Raw => lights.bits().to_string(),
                LightsFormat::Json => lights_json(lights).to_string(),
            };
            vec![Publication::state(topics.partition(partition, "lights"), payload)]
        }
        PanelEvent::PartitionAccessCodeChanged { partition, code } => {
            let payload = if rendering.mask_access_code {
                "****".to_string()
            } else {
                code.to_string()
            };
            vec![Publication::state(topics.partition(partition, "access-code"), payload)]
        }
        PanelEvent::ZoneOpenChanged { zone, open } => vec![Publication::state(
            topics.property(&format!("openzone-{zone}")),
            bool_payload(open),
        )],
        PanelEvent::ZoneAlarmChanged { zone, alarm } => vec![Publication::state(
            topics.property(&format!("alarmzone-{zone}")),
            bool_payload(alarm),
        )],
        PanelEvent::PanelTimeChanged { ref time } => {
            vec![Publication::state(topics.property("panel-time"), time.clone())]
        }
        PanelEvent::DriverStopped { auto_restart_secs } => {
            let text = match auto_restart_secs {
                Some(secs) => format!("DSC Interface stopped, restarting in {secs}s"),
                None => "DSC Interface stopped".to_string(),
            };
            vec![Publication::pulse(topics.maintenance(), text)]
        }
        PanelEvent::DriverStarted => {
            vec![Publication::pulse(topics.maintenance(), "DSC Interface started")]
        }
        PanelEvent::DriverRestarted => {
            vec![Publication::pulse(topics.maintenance(), "DSC Interface restarted")]
        }
    }
}

async fn handle_panel_event(
    event: PanelEvent,
    client: &AsyncClient,
    topics: &Topics,
    rendering: Rendering,
) {
    if let PanelEvent::PartitionStatusChanged { partition, status } = event {
        info!("Partition {partition}: {status}");
    }
    for publication in render_event(&event, topics, rendering) {
        publish(client, publication).await;
    }
}

// ---------------------------------------------------------------------------
// MQTT command handler
// ---------------------------------------------------------------------------

/// Acknowledgement published once a command has been carried out.
fn command_ack(command: &InboundCommand, topics: &Topics) -> Option<Publication> {
    match command {
        InboundCommand::RefreshStatus => {
            Some(Publication::pulse(topics.property("refresh-status"), "OK"))
        }
        InboundCommand::Maintenance(MaintenanceAction::Reboot) => {
            Some(Publication::pulse(topics.maintenance(), "Rebooting..."))
        }
        _ => None,
    }
}

/// Reply for a command that could not be parsed. Unknown maintenance
/// actions are answered on the maintenance topic.
fn rejection(property: &str, error: &DscError, topics: &Topics) -> Publication {
    if property == "maintenance" {
        Publication::pulse(topics.maintenance(), "Unknown maintenance command")
    } else {
        Publication::pulse(topics.message(), error.to_string())
    }
}

async fn handle_command(
    property: &str,
    payload: &str,
    panel: &Panel,
    client: &AsyncClient,
    topics: &Topics,
    reboot: &Notify,
) {
    let command = match parse_command(property, payload) {
        Ok(command) => command,
        Err(e) => {
            warn!("Rejected MQTT command {property}: {e}");
            publish(client, rejection(property, &e, topics)).await;
            return;
        }
    };

    // A reboot tears down the panel and the MQTT session, so it is handed to
    // the main loop rather than executed here.
    if command == InboundCommand::Maintenance(MaintenanceAction::Reboot) {
        info!("Reboot requested over MQTT");
        if let Some(ack) = command_ack(&command, topics) {
            publish(client, ack).await;
        }
        reboot.notify_one();
        return;
    }

    let ack = command_ack(&command, topics);
    match panel.execute(command).await {
        Ok(CommandOutcome::Sent) => {
            info!("Command {property}: sent");
            if let Some(ack) = ack {
                publish(client, ack).await;
            }
        }
        Ok(CommandOutcome::NoOp) => {
            info!("Command {property}: nothing to do");
            publish_message(client, topics, &format!("{property}: already in requested state"))
                .await;
        }
        Err(e) => {
            if e.is_retryable() {
                error!("Command {property} failed: {e}");
            } else {
                warn!("Command {property} rejected: {e}");
            }
            publish_message(client, topics, &e.to_string()).await;
        }
    }
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    // RUST_LOG controls verbosity (e.g. RUST_LOG=debug or RUST_LOG=dsc_keybus_bridge=trace).
    // Default: info.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    // systemd journal already adds timestamps, so omit them when running under systemd
    if std::env::var_os("JOURNAL_STREAM").is_some() {
        tracing_subscriber::fmt().without_time().with_env_filter(env_filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    let cli = Cli::parse();

    let (config, mut bridge_config) = load_config(&cli.config)?;
    let mut emulate_panel = config.keybus.emulate_panel;
    let mut mqtt_client_id = config.mqtt.client_id;
    let mut topics = Topics::new(&config.mqtt.base_topic);
    let (mut mqtt_host, mut mqtt_port) = parse_mqtt_url(&config.mqtt.url)?;

    let mut sighup = signal(SignalKind::hangup())?;
    let mut sigterm = signal(SignalKind::terminate())?;

    loop {
        // Keybus side
        let board = Arc::new(StatusBoard::new());
        let mut driver = LoopbackDriver::new(board.clone());
        if emulate_panel {
            info!("Emulating panel with {} partitions", bridge_config.partition_count);
            driver = driver.emulating(bridge_config.partition_count, &bridge_config.access_code);
        }
        let rendering = Rendering {
            lights_format: bridge_config.lights_format,
            mask_access_code: bridge_config.mask_access_code,
        };
        let panel = Arc::new(KeybusPanel::new(bridge_config.clone(), Arc::new(driver), board)?);
        let event_rx = panel.subscribe();
        panel.connect().context("Failed to start keybus driver")?;

        // Set up MQTT
        let mut mqtt_opts = MqttOptions::new(&mqtt_client_id, &mqtt_host, mqtt_port);
        mqtt_opts.set_keep_alive(Duration::from_secs(30));
        let (client, mut eventloop) = AsyncClient::new(mqtt_opts, 256);

        // Task 1: dispatcher tick
        let panel_run = Arc::clone(&panel);
        let run_handle = tokio::spawn(async move { panel_run.run().await });

        // Task 2: panel events → MQTT
        let client_events = client.clone();
        let topics_events = topics.clone();
        let event_handle = tokio::spawn(async move {
            let mut rx = event_rx;
            loop {
                match rx.recv().await {
                    Ok(event) => {
                        debug!("Panel event: {event:?}");
                        handle_panel_event(event, &client_events, &topics_events, rendering).await;
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                        warn!("Event receiver lagged, missed {n} events");
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => {
                        info!("Event channel closed");
                        break;
                    }
                }
            }
        });

        // Task 3: MQTT event loop (receives messages, handles commands)
        let panel_cmds = Arc::clone(&panel);
        let client_cmds = client.clone();
        let topics_cmds = topics.clone();
        let reboot = Arc::new(Notify::new());
        let reboot_cmds = Arc::clone(&reboot);
        let mqtt_handle = tokio::spawn(async move {
            let filter = topics_cmds.command_filter();
            loop {
                match eventloop.poll().await {
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        // rumqttc does not resubscribe on its own after a broker
                        // reconnect. Retained state is republished as well.
                        info!("MQTT: connected, subscribing to {filter}");
                        if let Err(e) = client_cmds.subscribe(&filter, QoS::AtLeastOnce).await {
                            error!("Failed to subscribe to {filter}: {e}");
                        }
                        panel_cmds.refresh_status();
                    }
                    Ok(Event::Incoming(Packet::Publish(msg))) => {
                        let Some(property) = command_property(&msg.topic, &topics_cmds.prefix)
                        else {
                            continue;
                        };
                        let payload = String::from_utf8_lossy(&msg.payload);
                        info!("MQTT command received: {property}");
                        handle_command(
                            property,
                            &payload,
                            &panel_cmds,
                            &client_cmds,
                            &topics_cmds,
                            &reboot_cmds,
                        )
                        .await;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        error!("MQTT event loop error: {e}");
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                }
            }
        });

        // Wait for a signal
        info!("MQTT bridge running. Send SIGHUP to restart, SIGINT/SIGTERM to stop.");
        let restart = tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Received SIGINT, shutting down...");
                false
            }
            _ = sigterm.recv() => {
                info!("Received SIGTERM, shutting down...");
                false
            }
            _ = sighup.recv() => {
                info!("Received SIGHUP, reloading config and restarting connections...");
                true
            }
            _ = reboot.notified() => {
                info!("Reboot requested, reloading config and restarting connections...");
                true
            }
        };

        // Abort tasks. The MQTT loop stays up until the final state and any
        // pending replies have been flushed to the broker.
        run_handle.abort();
        panel.disconnect();
        panel.poll().await;
        tokio::time::sleep(Duration::from_millis(100)).await;
        event_handle.abort();
        if let Err(e) = client.disconnect().await {
            debug!("MQTT disconnect: {e}");
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
        mqtt_handle.abort();

        if !restart {
            break;
        }

        // Reload config from disk; keep previous config on failure
        info!("Reloading config from {}", cli.config);
        match load_config(&cli.config) {
            Ok((new_config, new_bridge_config)) => match parse_mqtt_url(&new_config.mqtt.url) {
                Ok((new_host, new_port)) => {
                    bridge_config = new_bridge_config;
                    emulate_panel = new_config.keybus.emulate_panel;
                    mqtt_host = new_host;
                    mqtt_port = new_port;
                    mqtt_client_id = new_config.mqtt.client_id;
                    topics = Topics::new(&new_config.mqtt.base_topic);
                    info!("Config reloaded successfully");
                }
                Err(e) => warn!("Invalid MQTT URL in new config, keeping previous: {e}"),
            },
            Err(e) => warn!("Failed to reload config, keeping previous: {e:#}"),
        }

        info!("Reconnecting...");
    }

    info!("Shutdown complete");
    Ok(())
}

/// Parse an MQTT URL like "mqtt://host:port" into (host, port).
fn parse_mqtt_url(url: &str) -> Result<(String, u16)> {
    let stripped = url
        .strip_prefix("mqtt://")
        .or_else(|| url.strip_prefix("tcp://"))
        .unwrap_or(url);

    let (host, port_str) = stripped
        .rsplit_once(':')
        .context("MQTT URL must be in format mqtt://host:port")?;

    let port: u16 = port_str.parse().context("Invalid MQTT port number")?;

    Ok((host.to_string(), port))
}
