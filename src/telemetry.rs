/// Telemetry publishing over a persistent transport connection.
///
/// Topic: `{station_id}/sensor/{device_id}/state`, payload: the filtered
/// reading as a decimal integer. Delivery is best effort and at most once:
/// a failed publish triggers one reconnect attempt and the sample is
/// dropped, never retried or queued.

use core::fmt::{self, Write};

use heapless::String;

use crate::scheduler::{JobSink, PublishJob};

/// Maximum length of a telemetry topic
pub const MAX_TOPIC_LEN: usize = 128;

/// Topic string buffer
pub type TopicString = String<MAX_TOPIC_LEN>;

/// Payload buffer, large enough for any `i32`
pub type PayloadString = String<12>;

/// The persistent connection the publisher writes to
pub trait Transport {
    type Error: fmt::Debug;

    fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), Self::Error>;

    /// Re-establish the connection after a failure.
    fn reconnect(&mut self) -> Result<(), Self::Error>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TelemetryError {
    /// Station and device ids do not fit in [`MAX_TOPIC_LEN`]
    TopicTooLong,
}

impl fmt::Display for TelemetryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TopicTooLong => write!(f, "telemetry topic exceeds {MAX_TOPIC_LEN} bytes"),
        }
    }
}

/// Build the state topic for `device_id`.
pub fn state_topic(station_id: &str, device_id: &str) -> Result<TopicString, TelemetryError> {
    let mut topic = TopicString::new();
    write!(topic, "{}/sensor/{}/state", station_id, device_id)
        .map_err(|_| TelemetryError::TopicTooLong)?;
    Ok(topic)
}

/// Render a reading as its decimal payload.
pub fn format_payload(value: i32) -> PayloadString {
    let mut payload = PayloadString::new();
    // i32::MIN is 11 characters
    let _ = write!(payload, "{}", value);
    payload
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    Sent,
    Dropped,
}

/// Delivery counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishStats {
    pub sent: u32,
    pub dropped: u32,
    pub reconnects: u32,
}

impl fmt::Display for PublishStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "sent={} dropped={} reconnects={}",
            self.sent, self.dropped, self.reconnects
        )
    }
}

pub struct TelemetryPublisher<'a, T> {
    station_id: &'a str,
    transport: T,
    stats: PublishStats,
}

impl<'a, T: Transport> TelemetryPublisher<'a, T> {
    pub fn new(station_id: &'a str, transport: T) -> Self {
        Self {
            station_id,
            transport,
            stats: PublishStats::default(),
        }
    }

    pub fn stats(&self) -> PublishStats {
        self.stats
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Publish one reading. Transport failures are logged and recovered
    /// here; they never reach the caller.
    pub fn publish(&mut self, device_id: &str, value: i32) -> PublishOutcome {
        let topic = match state_topic(self.station_id, device_id) {
            Ok(topic) => topic,
            Err(e) => {
                log::error!("Dropping {} sample: {}", device_id, e);
                self.stats.dropped += 1;
                return PublishOutcome::Dropped;
            }
        };
        let payload = format_payload(value);

        match self.transport.publish(&topic, payload.as_bytes()) {
            Ok(()) => {
                log::debug!("{} <- {}", topic, payload);
                self.stats.sent += 1;
                PublishOutcome::Sent
            }
            Err(e) => {
                log::error!("Publish to {} failed: {:?}", topic, e);
                self.stats.dropped += 1;
                self.stats.reconnects += 1;
                if let Err(e) = self.transport.reconnect() {
                    log::error!("Reconnect failed: {:?}", e);
                } else {
                    log::info!("Transport reconnected");
                }
                PublishOutcome::Dropped
            }
        }
    }
}

impl<T: Transport> JobSink for TelemetryPublisher<'_, T> {
    fn publish(&mut self, job: PublishJob) {
        TelemetryPublisher::publish(self, job.device_id, job.value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Broken;

    #[derive(Default)]
    struct MockTransport {
        sent: std::vec::Vec<(std::string::String, std::string::String)>,
        fail_publishes: u32,
        fail_reconnect: bool,
        reconnects: u32,
    }

    impl Transport for MockTransport {
        type Error = Broken;

        fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), Broken> {
            if self.fail_publishes > 0 {
                self.fail_publishes -= 1;
                return Err(Broken);
            }
            self.sent.push((
                topic.into(),
                std::string::String::from_utf8(payload.to_vec()).unwrap(),
            ));
            Ok(())
        }

        fn reconnect(&mut self) -> Result<(), Broken> {
            self.reconnects += 1;
            if self.fail_reconnect {
                Err(Broken)
            } else {
                Ok(())
            }
        }
    }

    #[test]
    fn topic_format() {
        let topic = state_topic("livingroom", "apple_watch_rssi").unwrap();
        assert_eq!(topic.as_str(), "livingroom/sensor/apple_watch_rssi/state");
    }

    #[test]
    fn topic_too_long() {
        let station = "s".repeat(MAX_TOPIC_LEN);
        assert_eq!(
            state_topic(&station, "dev"),
            Err(TelemetryError::TopicTooLong)
        );
    }

    #[test]
    fn payload_is_decimal() {
        assert_eq!(format_payload(-66).as_str(), "-66");
        assert_eq!(format_payload(0).as_str(), "0");
        assert_eq!(format_payload(i32::MIN).as_str(), "-2147483648");
    }

    #[test]
    fn publish_sends_topic_and_payload() {
        let mut p = TelemetryPublisher::new("hall", MockTransport::default());
        assert_eq!(p.publish("sticknfind_rssi", -81), PublishOutcome::Sent);
        assert_eq!(
            p.transport().sent,
            [(
                "hall/sensor/sticknfind_rssi/state".to_string(),
                "-81".to_string()
            )]
        );
        assert_eq!(p.stats().sent, 1);
    }

    #[test]
    fn failure_reconnects_once_and_drops_sample() {
        let transport = MockTransport {
            fail_publishes: 1,
            ..Default::default()
        };
        let mut p = TelemetryPublisher::new("hall", transport);
        assert_eq!(p.publish("w", -60), PublishOutcome::Dropped);
        assert_eq!(p.transport().reconnects, 1);
        // Not retried
        assert!(p.transport().sent.is_empty());

        assert_eq!(p.publish("w", -61), PublishOutcome::Sent);
        assert_eq!(p.transport().reconnects, 1);
        assert_eq!(p.transport().sent[0].1, "-61");
        assert_eq!(
            p.stats(),
            PublishStats {
                sent: 1,
                dropped: 1,
                reconnects: 1
            }
        );
    }

    #[test]
    fn one_reconnect_per_failed_call() {
        let transport = MockTransport {
            fail_publishes: 3,
            fail_reconnect: true,
            ..Default::default()
        };
        let mut p = TelemetryPublisher::new("hall", transport);
        for _ in 0..3 {
            assert_eq!(p.publish("w", -60), PublishOutcome::Dropped);
        }
        assert_eq!(p.transport().reconnects, 3);
    }

    #[test]
    fn stats_render_for_status_line() {
        let transport = MockTransport {
            fail_publishes: 1,
            ..Default::default()
        };
        let mut p = TelemetryPublisher::new("hall", transport);
        p.publish("w", -60);
        p.publish("w", -61);
        p.publish("w", -62);
        assert_eq!(
            p.stats().to_string(),
            "sent=2 dropped=1 reconnects=1"
        );
    }

    #[test]
    fn oversized_topic_is_dropped_without_transport() {
        let station = "s".repeat(MAX_TOPIC_LEN);
        let mut p = TelemetryPublisher::new(&station, MockTransport::default());
        assert_eq!(p.publish("w", -60), PublishOutcome::Dropped);
        assert_eq!(p.transport().reconnects, 0);
        assert_eq!(p.stats().dropped, 1);
    }

    #[test]
    fn drains_as_job_sink() {
        use crate::scheduler::PublishScheduler;

        let q = PublishScheduler::<4>::new();
        for (id, v) in [("a", -1), ("b", -2), ("c", -3)] {
            q.enqueue(PublishJob {
                device_id: id,
                value: v,
            });
        }
        let mut p = TelemetryPublisher::new("st", MockTransport::default());
        q.drain(&mut p);
        let topics: std::vec::Vec<&str> =
            p.transport().sent.iter().map(|(t, _)| t.as_str()).collect();
        assert_eq!(
            topics,
            ["st/sensor/a/state", "st/sensor/b/state", "st/sensor/c/state"]
        );
    }
}
