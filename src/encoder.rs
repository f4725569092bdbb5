use derive_more::Display;

use crate::{
    error::{Error, Result},
    metric::{Check, Event, Metric, MetricValue, Observation, Rate, Tags, Timestamp},
};

/// Which optional segments end up on the wire.
#[derive(Clone, Copy, Debug, Default, Display, PartialEq, Eq, Hash)]
pub enum Dialect {
    /// Plain statsd. Metrics keep their tags, events are limited to the
    /// portable segments and service checks are rejected.
    #[display("statsd")]
    StatsD,
    /// DogStatsD, everything is encoded.
    #[default]
    #[display("datadog")]
    Datadog,
}

/// Maps observations to single wire lines, applying the metric prefix and
/// the default tags every line carries.
#[derive(Clone, Debug, Default)]
pub struct Encoder {
    prefix: Option<String>,
    default_tags: Tags,
    dialect: Dialect,
}

impl Encoder {
    pub fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            ..Default::default()
        }
    }
    pub fn with_prefix<S: Into<String>>(mut self, prefix: Option<S>) -> Self {
        self.prefix = prefix.map(Into::into).filter(|p| !p.is_empty());
        self
    }
    pub fn with_default_tags<T: Into<Tags>>(mut self, default_tags: T) -> Self {
        self.default_tags = default_tags.into();
        self
    }
    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    pub fn encode(&self, observation: &Observation) -> Result<String> {
        match observation {
            Observation::Metric(metric) => self.encode_metric(metric),
            Observation::Event(event) => self.encode_event(event),
            Observation::Check(check) => match self.dialect {
                Dialect::Datadog => self.encode_check(check),
                Dialect::StatsD => Err(Error::UnsupportedObservation {
                    dialect: self.dialect,
                    kind: observation.kind_name(),
                }),
            },
        }
    }

    fn encode_metric(&self, metric: &Metric) -> Result<String> {
        let value = metric.get_value().ok_or_else(|| {
            Error::EncodingRejected(format!("{} has no value", metric.get_name()))
        })?;
        let name = format_name(metric.get_name(), self.prefix.as_deref())?;
        let value = format_value(value, metric.is_delta())?;
        let mut line = format!("{name}:{value}|{}", metric.get_kind());
        if let Some(rate) = metric.get_rate() {
            line.push_str("|@");
            line.push_str(&format_rate(rate)?);
        }
        if let Some(tags) = format_tags(metric.get_tags(), &self.default_tags) {
            line.push_str("|#");
            line.push_str(&tags);
        }
        Ok(line)
    }

    fn encode_event(&self, event: &Event) -> Result<String> {
        let mut line = format!(
            "_e{{{},{}}}{}|{}",
            event.title.len(),
            event.text.len(),
            event.title,
            event.text
        );
        let alert_type = event.alert_type.map(|t| format!("|t:{t}"));
        let aggregation_key = event.aggregation_key.as_ref().map(|k| format!("|k:{k}"));
        let priority = event.priority.map(|p| format!("|p:{p}"));
        let segments = match self.dialect {
            Dialect::Datadog => vec![
                event
                    .date_happened
                    .as_ref()
                    .map(|d| format!("|d:{}", format_timestamp(d))),
                event.hostname.as_ref().map(|h| format!("|h:{h}")),
                aggregation_key,
                priority,
                event.source_type_name.as_ref().map(|s| format!("|s:{s}")),
                alert_type,
            ],
            // statsd servers expect the alert type first
            Dialect::StatsD => vec![alert_type, aggregation_key, priority],
        };
        for segment in segments.into_iter().flatten() {
            line.push_str(&segment);
        }
        if let Some(tags) = format_tags(&event.tags, &self.default_tags) {
            line.push_str("|#");
            line.push_str(&tags);
        }
        Ok(line)
    }

    fn encode_check(&self, check: &Check) -> Result<String> {
        let mut line = format!("_sc|{}|{}", check.name, check.status.code());
        if let Some(timestamp) = &check.timestamp {
            line.push_str(&format!("|d:{}", format_timestamp(timestamp)));
        }
        if let Some(hostname) = &check.hostname {
            line.push_str(&format!("|h:{hostname}"));
        }
        if let Some(tags) = format_tags(&check.tags, &self.default_tags) {
            line.push_str("|#");
            line.push_str(&tags);
        }
        if let Some(message) = &check.message {
            line.push_str(&format!("|m:{message}"));
        }
        Ok(line)
    }
}

pub(crate) fn format_name(name: &str, prefix: Option<&str>) -> Result<String> {
    if name.is_empty() {
        return Err(Error::EncodingRejected("metric name is empty".to_string()));
    }
    if name.contains('\n') {
        return Err(Error::EncodingRejected(format!(
            "metric name {name:?} contains a line break"
        )));
    }
    Ok(match prefix {
        Some(prefix) if !prefix.is_empty() => format!("{prefix}.{name}"),
        _ => name.to_string(),
    })
}

pub(crate) fn format_value(value: &MetricValue, delta: bool) -> Result<String> {
    match value {
        MetricValue::Float(v) if !v.is_finite() => {
            return Err(Error::EncodingRejected(format!("{v} is not a finite value")))
        }
        MetricValue::Text(v) if v.contains('\n') => {
            return Err(Error::EncodingRejected(format!(
                "value {v:?} contains a line break"
            )))
        }
        _ => {}
    }
    if delta && value.is_positive() {
        Ok(format!("+{value}"))
    } else {
        Ok(value.to_string())
    }
}

/// Renders the rate without its `@` marker.
pub(crate) fn format_rate(rate: Rate) -> Result<String> {
    match rate {
        Rate::Probability(p) => {
            if p > 0.0 && p <= 1.0 {
                Ok(p.to_string())
            } else {
                Err(Error::EncodingRejected(format!(
                    "sample rate {p} is outside of (0, 1]"
                )))
            }
        }
        Rate::Interval(interval) => {
            let secs = interval.as_secs_f64();
            let rendered = format!("{secs:.3}");
            let rendered = rendered.trim_end_matches('0').trim_end_matches('.');
            // Sub-millisecond intervals round down to a zero rate.
            if secs > 1.0 || rendered == "0" {
                return Err(Error::EncodingRejected(format!(
                    "sample interval {interval:?} is outside of (0s, 1s]"
                )));
            }
            Ok(rendered.to_string())
        }
    }
}

pub(crate) fn format_tags(tags: &Tags, defaults: &Tags) -> Option<String> {
    if tags.is_empty() && defaults.is_empty() {
        return None;
    }
    Some(tags.union(defaults).collect::<Vec<_>>().join(","))
}

pub(crate) fn format_timestamp(timestamp: &Timestamp) -> i64 {
    timestamp.as_unix()
}

#[cfg(test)]
mod test {
    use std::time::Duration;

    use chrono::{TimeZone, Utc};
    use maplit::btreemap;

    use super::*;
    use crate::metric::{AlertType, MetricKind, Priority, Status};

    fn encode<O: Into<Observation>>(observation: O) -> String {
        Encoder::default()
            .encode(&observation.into())
            .expect("Failed to encode observation!")
    }

    #[test]
    fn test_plain_metrics() {
        let cases = vec![
            (Metric::counting("foo", 1), "foo:1|c"),
            (Metric::counting("foo", -1), "foo:-1|c"),
            (Metric::gauge("foo", 1), "foo:1|g"),
            (Metric::histogram("foo", -42), "foo:-42|h"),
            (Metric::set("foo", "bar"), "foo:bar|s"),
            (Metric::timing("foo", 100), "foo:100|ms"),
            (Metric::gauge("foo", 2.5), "foo:2.5|g"),
        ];
        for (metric, expected) in cases {
            assert_eq!(encode(metric), expected);
        }
    }

    #[test]
    fn test_sampling_rates() {
        assert_eq!(encode(Metric::counting("foo", 1).with_rate(0.1)), "foo:1|c|@0.1");
        assert_eq!(
            encode(Metric::set("foo", "bar").with_rate(Duration::from_secs(1))),
            "foo:bar|s|@1"
        );
        assert_eq!(
            encode(Metric::histogram("foo", -42).with_rate(Duration::from_micros(20_000))),
            "foo:-42|h|@0.02"
        );
        assert_eq!(format_rate(Duration::from_millis(250).into()).unwrap(), "0.25");
        assert_eq!(format_rate(Duration::from_millis(1).into()).unwrap(), "0.001");
    }

    #[test]
    fn test_rejected_rates() {
        let encoder = Encoder::default();
        for rate in [0.0, 1.5, -0.1, f64::NAN] {
            let metric: Observation = Metric::counting("foo", 1).with_rate(rate).into();
            assert!(matches!(
                encoder.encode(&metric),
                Err(Error::EncodingRejected(_))
            ));
        }
        for interval in [
            Duration::ZERO,
            Duration::from_micros(400),
            Duration::from_millis(1500),
            Duration::from_secs(10),
        ] {
            let metric: Observation = Metric::counting("foo", 1).with_rate(interval).into();
            assert!(
                matches!(encoder.encode(&metric), Err(Error::EncodingRejected(_))),
                "{interval:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_tag_merging() {
        let cases = vec![
            (Tags::new(), Tags::new(), ""),
            (btreemap! {"bar" => "baz"}.into(), Tags::new(), "|#bar:baz"),
            (Tags::new(), btreemap! {"bar" => "baz"}.into(), "|#bar:baz"),
            (
                btreemap! {"bar" => "baz"}.into(),
                btreemap! {"bar" => "qux"}.into(),
                "|#bar:baz,bar:qux",
            ),
        ];
        for (tags, defaults, expected) in cases {
            let encoder = Encoder::default().with_default_tags::<Tags>(defaults);
            let metric = Metric::counting("foo", 1).with_tags(tags).into();
            assert_eq!(encoder.encode(&metric).unwrap(), format!("foo:1|c{expected}"));
        }
    }

    #[test]
    fn test_prefix_and_delta() {
        let encoder = Encoder::default().with_prefix(Some("app"));
        let metric = Metric::gauge("fuel", 5).delta(true).into();
        assert_eq!(encoder.encode(&metric).unwrap(), "app.fuel:+5|g");
        let metric = Metric::gauge("fuel", -5).delta(true).into();
        assert_eq!(encoder.encode(&metric).unwrap(), "app.fuel:-5|g");
        let empty_prefix = Encoder::default().with_prefix(Some(""));
        let metric = Metric::timing("t", 7).with_rate(0.5).with_tags(["a"]).into();
        assert_eq!(empty_prefix.encode(&metric).unwrap(), "t:7|ms|@0.5|#a");
    }

    #[test]
    fn test_rejected_metrics() {
        let encoder = Encoder::default();
        let rejected: Vec<Observation> = vec![
            Metric::new(MetricKind::Gauge, "foo", None).into(),
            Metric::counting("", 1).into(),
            Metric::gauge("foo", f64::INFINITY).into(),
            Metric::set("foo", "a\nb").into(),
        ];
        for observation in rejected {
            assert!(matches!(
                encoder.encode(&observation),
                Err(Error::EncodingRejected(_))
            ));
        }
    }

    #[test]
    fn test_events() {
        assert_eq!(
            encode(Event::new("Man down!", "This server needs assistance.")),
            "_e{9,29}Man down!|This server needs assistance."
        );
        let date = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
        let event = Event::new("title", "text")
            .with_date(date)
            .with_hostname("web-1")
            .with_aggregation_key("deploys")
            .with_priority(Priority::Low)
            .with_source_type("jenkins")
            .with_alert_type(AlertType::Success)
            .with_tags(["env:prod"]);
        assert_eq!(
            encode(event.clone()),
            "_e{5,4}title|text|d:1577836800|h:web-1|k:deploys|p:low|s:jenkins|t:success|#env:prod"
        );
        let statsd = Encoder::new(Dialect::StatsD);
        assert_eq!(
            statsd.encode(&event.into()).unwrap(),
            "_e{5,4}title|text|t:success|k:deploys|p:low|#env:prod"
        );
    }

    #[test]
    fn test_checks() {
        let cases = vec![
            ("OK", "_sc|srv|0"),
            ("warning", "_sc|srv|1"),
            ("crit", "_sc|srv|2"),
            ("UNKNOWN", "_sc|srv|3"),
        ];
        for (status, expected) in cases {
            let status: Status = status.parse().unwrap();
            assert_eq!(encode(Check::new("srv", status)), expected);
        }
        let check = Check::new("srv", Status::Ok)
            .with_tags(btreemap! {"foo" => "bar"})
            .with_message("baz");
        assert_eq!(encode(check), "_sc|srv|0|#foo:bar|m:baz");
        let check = Check::new("srv", Status::Critical)
            .with_timestamp(1_577_836_800.7)
            .with_hostname("db-2");
        assert_eq!(encode(check), "_sc|srv|2|d:1577836800|h:db-2");
    }

    #[test]
    fn test_statsd_rejects_checks() {
        let statsd = Encoder::new(Dialect::StatsD);
        let check = Check::new("srv", Status::Ok).into();
        assert!(matches!(
            statsd.encode(&check),
            Err(Error::UnsupportedObservation {
                dialect: Dialect::StatsD,
                ..
            })
        ));
    }

    #[test]
    fn test_default_tags_apply_to_events_and_checks() {
        let encoder = Encoder::default().with_default_tags(["service:api"]);
        let event = Event::new("a", "b").into();
        assert_eq!(encoder.encode(&event).unwrap(), "_e{1,1}a|b|#service:api");
        let check = Check::new("srv", Status::Warning).into();
        assert_eq!(encoder.encode(&check).unwrap(), "_sc|srv|1|#service:api");
    }
}
