//! MQTT bus adapter.
//!
//! Trigger messages arrive as publishes on the trigger topic, one message per
//! payload. Each matched trigger runs on its own short-lived thread so a slow
//! save never stalls the connection loop. Notifications are published with
//! QoS 1 on the notify topic. Availability is tracked with a retained
//! `online` and a last-will `offline`.

use anyhow::{anyhow, Context, Result};
use rumqttc::v5::mqttbytes::v5::LastWill;
use rumqttc::v5::mqttbytes::QoS;
use rumqttc::v5::{Client, Connection, Event, Incoming, MqttOptions};
use rumqttc::Transport;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use super::{MessageNames, Notification, Notifier, Trigger, TriggerRouter};

const PAYLOAD_ONLINE: &str = "online";
const PAYLOAD_OFFLINE: &str = "offline";
const RECONNECT_DELAY: Duration = Duration::from_secs(5);
const REQUEST_CHANNEL_CAPACITY: usize = 10;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MqttEndpoint {
    pub host: String,
    pub port: u16,
    pub use_tls: bool,
}

/// Parse `host:port`, optionally prefixed with `mqtt://`, `tcp://`,
/// `mqtts://` or `ssl://`.
pub fn parse_mqtt_endpoint(addr: &str) -> Result<MqttEndpoint> {
    let mut use_tls = false;
    let mut remainder = addr.trim();

    if let Some((scheme, rest)) = remainder.split_once("://") {
        match scheme {
            "mqtt" | "tcp" => {}
            "mqtts" | "ssl" => use_tls = true,
            other => return Err(anyhow!("unsupported MQTT scheme: {}", other)),
        }
        remainder = rest;
    }

    let (host, port) = split_host_port(remainder)?;
    if host.is_empty() {
        return Err(anyhow!("missing MQTT host in {}", addr));
    }
    Ok(MqttEndpoint {
        host,
        port,
        use_tls,
    })
}

fn split_host_port(addr: &str) -> Result<(String, u16)> {
    if let Some(rest) = addr.strip_prefix('[') {
        let (host, rest) = rest
            .split_once(']')
            .ok_or_else(|| anyhow!("invalid MQTT address: {}", addr))?;
        let port = rest
            .strip_prefix(':')
            .ok_or_else(|| anyhow!("missing MQTT port in {}", addr))?;
        let port: u16 = port.parse().context("invalid MQTT port")?;
        return Ok((host.to_string(), port));
    }

    let (host, port) = addr
        .rsplit_once(':')
        .ok_or_else(|| anyhow!("missing MQTT port in {}", addr))?;
    let port: u16 = port.parse().context("invalid MQTT port")?;
    Ok((host.to_string(), port))
}

/// Topics the daemon talks on.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BusTopics {
    pub trigger: String,
    pub notify: String,
    pub availability: String,
}

/// Credentials and identity for the broker session.
#[derive(Clone, Debug, Default)]
pub struct BusLogin {
    pub client_id: String,
    pub username: Option<String>,
    pub password: Option<String>,
}

pub struct MqttBus {
    client: Client,
    topics: BusTopics,
    names: MessageNames,
}

impl MqttBus {
    /// Create the client. Nothing is sent until the returned connection is
    /// driven by `spawn_listener`.
    pub fn connect(
        endpoint: &MqttEndpoint,
        login: &BusLogin,
        topics: BusTopics,
        names: MessageNames,
    ) -> Result<(Self, Connection)> {
        let mut options = MqttOptions::new(&login.client_id, &endpoint.host, endpoint.port);
        options.set_keep_alive(Duration::from_secs(60));
        options.set_clean_start(true);
        if let Some(user) = login.username.as_deref() {
            options.set_credentials(user, login.password.as_deref().unwrap_or_default());
        }
        let will = LastWill::new(
            topics.availability.as_str(),
            PAYLOAD_OFFLINE.as_bytes().to_vec(),
            QoS::AtLeastOnce,
            true,
            None,
        );
        options.set_last_will(will);
        if endpoint.use_tls {
            options.set_transport(Transport::tls_with_default_config());
        }

        let (client, connection) = Client::new(options, REQUEST_CHANNEL_CAPACITY);
        log::info!(
            "MQTT client created for {}:{} (TLS: {}, auth: {})",
            endpoint.host,
            endpoint.port,
            endpoint.use_tls,
            login.username.is_some()
        );
        Ok((
            Self {
                client,
                topics,
                names,
            },
            connection,
        ))
    }

    /// Drive the connection on a dedicated thread, dispatching every matched
    /// trigger on a thread of its own. Returns once `stop` is set and the
    /// connection yields its next event.
    pub fn spawn_listener(
        &self,
        mut connection: Connection,
        router: TriggerRouter,
        dispatch: Arc<dyn Fn(Trigger) + Send + Sync>,
        stop: Arc<AtomicBool>,
    ) -> Result<JoinHandle<()>> {
        let client = self.client.clone();
        let topics = self.topics.clone();
        std::thread::Builder::new()
            .name("mqtt-listener".to_string())
            .spawn(move || {
                for event in connection.iter() {
                    if stop.load(Ordering::Relaxed) {
                        break;
                    }
                    match event {
                        Ok(Event::Incoming(Incoming::ConnAck(_))) => {
                            on_connected(&client, &topics);
                        }
                        Ok(Event::Incoming(Incoming::Publish(publish))) => {
                            let message = match std::str::from_utf8(&publish.payload) {
                                Ok(message) => message,
                                Err(e) => {
                                    log::warn!("Skipping trigger with non-UTF-8 payload: {}", e);
                                    continue;
                                }
                            };
                            for trigger in router.route(message) {
                                spawn_trigger(trigger, &dispatch);
                            }
                        }
                        Ok(_) => {}
                        Err(e) => {
                            if stop.load(Ordering::Relaxed) {
                                break;
                            }
                            log::warn!("MQTT connection error: {}. Reconnecting...", e);
                            std::thread::sleep(RECONNECT_DELAY);
                        }
                    }
                }
                log::debug!("MQTT listener stopped");
            })
            .context("spawn MQTT listener thread")
    }

    /// Mark the daemon offline and close the session.
    pub fn disconnect(&self) -> Result<()> {
        self.client.publish(
            self.topics.availability.clone(),
            QoS::AtLeastOnce,
            true,
            PAYLOAD_OFFLINE.as_bytes().to_vec(),
        )?;
        self.client.disconnect()?;
        Ok(())
    }
}

impl Notifier for MqttBus {
    fn notify(&self, notification: &Notification) -> Result<()> {
        let message = notification.render(&self.names);
        self.client
            .publish(
                self.topics.notify.clone(),
                QoS::AtLeastOnce,
                false,
                message.clone().into_bytes(),
            )
            .with_context(|| format!("publish {}", message))?;
        log::debug!("published {} to {}", message, self.topics.notify);
        Ok(())
    }
}

// The listener thread owns the event loop, so it must never block on the
// request channel it is responsible for draining.
fn on_connected(client: &Client, topics: &BusTopics) {
    if let Err(e) = client.try_subscribe(topics.trigger.clone(), QoS::AtLeastOnce) {
        log::error!("failed to subscribe to {}: {}", topics.trigger, e);
        return;
    }
    if let Err(e) = client.try_publish(
        topics.availability.clone(),
        QoS::AtLeastOnce,
        true,
        PAYLOAD_ONLINE.as_bytes().to_vec(),
    ) {
        log::warn!("failed to publish availability: {}", e);
    }
    log::info!("Subscribed to {}", topics.trigger);
}

fn spawn_trigger(trigger: Trigger, dispatch: &Arc<dyn Fn(Trigger) + Send + Sync>) {
    let dispatch = Arc::clone(dispatch);
    let spawned = std::thread::Builder::new()
        .name(format!("trigger-{:?}", trigger).to_lowercase())
        .spawn(move || dispatch(trigger));
    if let Err(e) = spawned {
        log::error!("failed to spawn handler for {:?}: {}", trigger, e);
    }
}
