//! MQTT transport on the ESP-IDF client.
//!
//! Publishes at QoS 0, not retained. The client's event callback tracks the
//! broker session; `connect` and `reconnect` block until the broker has
//! accepted the session or [`CONNECT_TIMEOUT`] passes.

use std::fmt;
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use esp_idf_svc::mqtt::client::{
    EspMqttClient, EspMqttEvent, EventPayload, MqttClientConfiguration, QoS,
};
use esp_idf_svc::sys::EspError;

use blepresence::config::StationConfig;
use blepresence::telemetry::Transport;

/// Default broker port when the configured server has none
const DEFAULT_PORT: u16 = 1883;

/// Upper bound on waiting for the broker to accept a session
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug)]
pub enum MqttError {
    Esp(EspError),
    /// No session with the broker
    NotConnected,
    /// The broker did not accept a session within [`CONNECT_TIMEOUT`]
    Timeout,
}

impl From<EspError> for MqttError {
    fn from(e: EspError) -> Self {
        Self::Esp(e)
    }
}

impl fmt::Display for MqttError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Esp(e) => write!(f, "{}", e),
            Self::NotConnected => write!(f, "not connected to broker"),
            Self::Timeout => write!(f, "broker did not accept session within {:?}", CONNECT_TIMEOUT),
        }
    }
}

impl std::error::Error for MqttError {}

/// Session flag set from the client's event task, waited on by the publisher
#[derive(Default)]
struct Session {
    connected: Mutex<bool>,
    changed: Condvar,
}

impl Session {
    fn set(&self, connected: bool) {
        if let Ok(mut flag) = self.connected.lock() {
            *flag = connected;
            self.changed.notify_all();
        }
    }

    fn is_up(&self) -> bool {
        self.connected.lock().map(|flag| *flag).unwrap_or(false)
    }

    /// Wait until the session is up. Returns whether it came up in time.
    fn wait_up(&self, timeout: Duration) -> bool {
        let Ok(flag) = self.connected.lock() else {
            return false;
        };
        match self.changed.wait_timeout_while(flag, timeout, |up| !*up) {
            Ok((flag, _)) => *flag,
            Err(_) => false,
        }
    }
}

pub struct MqttTransport {
    url: String,
    conf: MqttClientConfiguration<'static>,
    session: Arc<Session>,
    client: EspMqttClient<'static>,
}

impl MqttTransport {
    pub fn connect(station: &StationConfig<'static>) -> Result<Self, MqttError> {
        let url = broker_url(station.mqtt.server);
        let conf = MqttClientConfiguration {
            client_id: Some(station.station_id),
            username: station.mqtt.username,
            password: station.mqtt.password,
            ..Default::default()
        };
        let session = Arc::new(Session::default());
        let client = new_client(&url, &conf, &session)?;
        log::info!("MQTT client started for {}", url);

        let transport = Self {
            url,
            conf,
            session,
            client,
        };
        transport.await_session()?;
        Ok(transport)
    }

    fn await_session(&self) -> Result<(), MqttError> {
        if self.session.wait_up(CONNECT_TIMEOUT) {
            Ok(())
        } else {
            Err(MqttError::Timeout)
        }
    }
}

impl Transport for MqttTransport {
    type Error = MqttError;

    fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), MqttError> {
        if !self.session.is_up() {
            return Err(MqttError::NotConnected);
        }
        self.client
            .publish(topic, QoS::AtMostOnce, false, payload)
            .map(|_| ())?;
        Ok(())
    }

    /// Give the client's own reconnect a chance first; rebuild it only if
    /// the session is still down after that.
    fn reconnect(&mut self) -> Result<(), MqttError> {
        if self.await_session().is_ok() {
            return Ok(());
        }
        log::warn!("MQTT session still down, rebuilding client");
        // Fresh flag so late events from the old client cannot touch it
        let session = Arc::new(Session::default());
        self.client = new_client(&self.url, &self.conf, &session)?;
        self.session = session;
        self.await_session()
    }
}

fn new_client(
    url: &str,
    conf: &MqttClientConfiguration<'static>,
    session: &Arc<Session>,
) -> Result<EspMqttClient<'static>, EspError> {
    let session = Arc::clone(session);
    EspMqttClient::new_cb(url, conf, move |event: EspMqttEvent<'_>| {
        match event.payload() {
            EventPayload::Connected(_) => {
                log::info!("MQTT connected");
                session.set(true);
            }
            EventPayload::Disconnected => {
                log::warn!("MQTT disconnected");
                session.set(false);
            }
            EventPayload::Error(e) => log::error!("MQTT error: {:?}", e),
            _ => {}
        }
    })
}

/// `host` or `host:port` (or a full URL) to an `mqtt://` broker URL.
fn broker_url(server: &str) -> String {
    if server.contains("://") {
        server.to_string()
    } else if server.contains(':') {
        format!("mqtt://{}", server)
    } else {
        format!("mqtt://{}:{}", server, DEFAULT_PORT)
    }
}
