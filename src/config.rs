/// Station configuration.
///
/// Read once at startup from a JSON document and treated as read-only
/// afterwards. All strings borrow from the input buffer, so JSON escape
/// sequences cannot be decoded and are rejected.
///
/// ```json
/// {
///   "station_id": "livingroom",
///   "wifi": { "ssid": "home", "password": "secret" },
///   "mqtt": { "server": "192.168.1.10", "username": "sensor", "password": "secret" }
/// }
/// ```

use core::fmt;

use serde::Deserialize;

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
pub struct WifiConfig<'a> {
    pub ssid: &'a str,
    pub password: &'a str,
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
pub struct MqttConfig<'a> {
    /// Broker host name or address, optionally with `:port`
    pub server: &'a str,
    #[serde(default, borrow)]
    pub username: Option<&'a str>,
    #[serde(default, borrow)]
    pub password: Option<&'a str>,
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
pub struct StationConfig<'a> {
    /// Prefix of every telemetry topic; also the MQTT client id
    pub station_id: &'a str,
    #[serde(borrow)]
    pub wifi: WifiConfig<'a>,
    #[serde(borrow)]
    pub mqtt: MqttConfig<'a>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// Not valid JSON, or missing/mistyped fields
    Parse,
    /// A required field is empty
    Empty(&'static str),
    /// Station id contains an MQTT topic separator or wildcard
    InvalidStationId,
    /// A string field contains a JSON escape sequence
    Escaped(&'static str),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Parse => write!(f, "malformed configuration"),
            Self::Empty(field) => write!(f, "configuration field '{field}' is empty"),
            Self::InvalidStationId => {
                write!(f, "station_id must not contain '/', '+' or '#'")
            }
            Self::Escaped(field) => {
                write!(f, "configuration field '{field}' contains an escape sequence")
            }
        }
    }
}

impl<'a> StationConfig<'a> {
    /// Parse and validate a configuration document.
    pub fn from_json(data: &'a [u8]) -> Result<Self, ConfigError> {
        let (config, _) =
            serde_json_core::from_slice::<StationConfig<'a>>(data).map_err(|_| ConfigError::Parse)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let fields = [
            ("station_id", Some(self.station_id)),
            ("wifi.ssid", Some(self.wifi.ssid)),
            ("wifi.password", Some(self.wifi.password)),
            ("mqtt.server", Some(self.mqtt.server)),
            ("mqtt.username", self.mqtt.username),
            ("mqtt.password", self.mqtt.password),
        ];
        for (name, value) in fields {
            if value.is_some_and(|v| v.contains('\\')) {
                return Err(ConfigError::Escaped(name));
            }
        }
        if self.station_id.is_empty() {
            return Err(ConfigError::Empty("station_id"));
        }
        if self.station_id.contains(['/', '+', '#']) {
            return Err(ConfigError::InvalidStationId);
        }
        if self.wifi.ssid.is_empty() {
            return Err(ConfigError::Empty("wifi.ssid"));
        }
        if self.mqtt.server.is_empty() {
            return Err(ConfigError::Empty("mqtt.server"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL: &[u8] = br#"{
        "station_id": "livingroom",
        "wifi": {"ssid": "home", "password": "hunter22"},
        "mqtt": {"server": "192.168.1.10", "username": "sensor", "password": "pw"}
    }"#;

    #[test]
    fn parses_full_document() {
        let config = StationConfig::from_json(FULL).unwrap();
        assert_eq!(config.station_id, "livingroom");
        assert_eq!(config.wifi.ssid, "home");
        assert_eq!(config.wifi.password, "hunter22");
        assert_eq!(config.mqtt.server, "192.168.1.10");
        assert_eq!(config.mqtt.username, Some("sensor"));
        assert_eq!(config.mqtt.password, Some("pw"));
    }

    #[test]
    fn mqtt_credentials_are_optional() {
        let json = br#"{"station_id":"s","wifi":{"ssid":"n","password":""},"mqtt":{"server":"broker"}}"#;
        let config = StationConfig::from_json(json).unwrap();
        assert_eq!(config.mqtt.username, None);
        assert_eq!(config.mqtt.password, None);
    }

    #[test]
    fn rejects_malformed_json() {
        assert_eq!(StationConfig::from_json(b"{"), Err(ConfigError::Parse));
        assert_eq!(
            StationConfig::from_json(br#"{"station_id":"s"}"#),
            Err(ConfigError::Parse)
        );
    }

    #[test]
    fn rejects_empty_required_fields() {
        let json = br#"{"station_id":"","wifi":{"ssid":"n","password":""},"mqtt":{"server":"b"}}"#;
        assert_eq!(
            StationConfig::from_json(json),
            Err(ConfigError::Empty("station_id"))
        );
        let json = br#"{"station_id":"s","wifi":{"ssid":"n","password":""},"mqtt":{"server":""}}"#;
        assert_eq!(
            StationConfig::from_json(json),
            Err(ConfigError::Empty("mqtt.server"))
        );
    }

    #[test]
    fn rejects_topic_separators_in_station_id() {
        let json = br#"{"station_id":"a/b","wifi":{"ssid":"n","password":""},"mqtt":{"server":"b"}}"#;
        assert_eq!(
            StationConfig::from_json(json),
            Err(ConfigError::InvalidStationId)
        );
    }

    #[test]
    fn rejects_escaped_quote_in_password() {
        let json = br#"{"station_id":"s","wifi":{"ssid":"n","password":"pa\"ss"},"mqtt":{"server":"b"}}"#;
        assert_eq!(
            StationConfig::from_json(json),
            Err(ConfigError::Escaped("wifi.password"))
        );
    }

    #[test]
    fn rejects_unicode_escape_in_ssid() {
        let json = br#"{"station_id":"s","wifi":{"ssid":"caf\u00e9","password":""},"mqtt":{"server":"b"}}"#;
        assert_eq!(
            StationConfig::from_json(json),
            Err(ConfigError::Escaped("wifi.ssid"))
        );
    }

    #[test]
    fn rejects_escaped_backslash_in_mqtt_credentials() {
        let json = br#"{"station_id":"s","wifi":{"ssid":"n","password":""},"mqtt":{"server":"b","password":"a\\b"}}"#;
        assert_eq!(
            StationConfig::from_json(json),
            Err(ConfigError::Escaped("mqtt.password"))
        );
    }

    #[test]
    fn accepts_literal_unicode() {
        let json = r#"{"station_id":"s","wifi":{"ssid":"café","password":""},"mqtt":{"server":"b"}}"#;
        let config = StationConfig::from_json(json.as_bytes()).unwrap();
        assert_eq!(config.wifi.ssid, "café");
    }
}
