use std::{
    collections::{BTreeMap, BTreeSet, HashMap},
    fmt,
    str::FromStr,
    time::Duration,
};

use chrono::{DateTime, Utc};
use derive_more::{Display, From};

use crate::error::Error;

/// What kind of metric is it? Kinds only differ in their wire suffix.
#[derive(Clone, Copy, Debug, Display, PartialEq, Eq, Hash)]
pub enum MetricKind {
    #[display("c")]
    Counting,
    #[display("g")]
    Gauge,
    #[display("h")]
    Histogram,
    #[display("s")]
    Set,
    #[display("ms")]
    Timing,
}

impl MetricKind {
    pub fn name(self) -> &'static str {
        match self {
            MetricKind::Counting => "counting metric",
            MetricKind::Gauge => "gauge metric",
            MetricKind::Histogram => "histogram metric",
            MetricKind::Set => "set metric",
            MetricKind::Timing => "timing metric",
        }
    }
}

/// Numeric metrics carry an integer or a float, set metrics usually carry text.
#[derive(Clone, Debug, PartialEq, From)]
pub enum MetricValue {
    Int(i64),
    Float(f64),
    Text(String),
}

impl MetricValue {
    pub(crate) fn is_positive(&self) -> bool {
        match self {
            MetricValue::Int(v) => *v > 0,
            MetricValue::Float(v) => *v > 0.0,
            MetricValue::Text(_) => false,
        }
    }
}

impl From<i32> for MetricValue {
    fn from(v: i32) -> Self {
        Self::Int(v.into())
    }
}

impl From<u32> for MetricValue {
    fn from(v: u32) -> Self {
        Self::Int(v.into())
    }
}

impl From<&str> for MetricValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl fmt::Display for MetricValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricValue::Int(v) => write!(f, "{v}"),
            MetricValue::Float(v) => write!(f, "{v}"),
            MetricValue::Text(v) => f.write_str(v),
        }
    }
}

/// Sampling rate of a metric.
///
/// A plain probability is rendered as given. An interval is rendered in seconds
/// with at most three decimals, and its length in seconds doubles as the
/// probability used when sampling the buffer.
#[derive(Clone, Copy, Debug, PartialEq, From)]
pub enum Rate {
    Probability(f64),
    Interval(Duration),
}

impl Rate {
    pub fn as_probability(&self) -> f64 {
        match self {
            Rate::Probability(p) => *p,
            Rate::Interval(interval) => interval.as_secs_f64(),
        }
    }
}

/// Sorted set of rendered tags, either `key:value` or verbatim strings.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Tags(BTreeSet<String>);

impl Tags {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn insert<S: Into<String>>(&mut self, tag: S) -> bool {
        self.0.insert(tag.into())
    }
    pub fn insert_pair<K: fmt::Display, V: fmt::Display>(&mut self, key: K, value: V) -> bool {
        self.0.insert(format!("{key}:{value}"))
    }
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
    pub fn len(&self) -> usize {
        self.0.len()
    }
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
    /// Sorted union of both tag sets. Only byte-identical tags are collapsed,
    /// so `bar:baz` and `bar:qux` both survive.
    pub fn union<'a>(&'a self, other: &'a Tags) -> impl Iterator<Item = &'a str> {
        self.0.union(&other.0).map(String::as_str)
    }
}

impl<K: fmt::Display, V: fmt::Display> From<BTreeMap<K, V>> for Tags {
    fn from(map: BTreeMap<K, V>) -> Self {
        Self(map.iter().map(|(k, v)| format!("{k}:{v}")).collect())
    }
}

impl<K: fmt::Display, V: fmt::Display, S> From<HashMap<K, V, S>> for Tags {
    fn from(map: HashMap<K, V, S>) -> Self {
        Self(map.iter().map(|(k, v)| format!("{k}:{v}")).collect())
    }
}

impl<S: Into<String>> From<Vec<S>> for Tags {
    fn from(tags: Vec<S>) -> Self {
        tags.into_iter().collect()
    }
}

impl<S: Into<String>, const N: usize> From<[S; N]> for Tags {
    fn from(tags: [S; N]) -> Self {
        tags.into_iter().collect()
    }
}

impl<S: AsRef<str>> From<&[S]> for Tags {
    fn from(tags: &[S]) -> Self {
        Self(tags.iter().map(|t| t.as_ref().to_string()).collect())
    }
}

impl From<BTreeSet<String>> for Tags {
    fn from(tags: BTreeSet<String>) -> Self {
        Self(tags)
    }
}

impl From<&str> for Tags {
    fn from(tag: &str) -> Self {
        [tag].into()
    }
}

impl From<String> for Tags {
    fn from(tag: String) -> Self {
        [tag].into()
    }
}

impl<S: Into<String>> FromIterator<S> for Tags {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

/// One measurement: a kind, a stat name and an optional value.
///
/// A metric without a value is accepted at registration and silently
/// dropped when the buffer is flushed.
#[derive(Clone, Debug, PartialEq)]
pub struct Metric {
    kind: MetricKind,
    /// Name of the metric, called stat in statsd
    name: String,
    value: Option<MetricValue>,
    rate: Option<Rate>,
    delta: bool,
    tags: Tags,
}

impl Metric {
    pub fn new<S: Into<String>>(kind: MetricKind, name: S, value: Option<MetricValue>) -> Self {
        Self {
            kind,
            name: name.into(),
            value,
            rate: None,
            delta: false,
            tags: Tags::default(),
        }
    }
    pub fn counting<S: Into<String>, V: Into<MetricValue>>(name: S, value: V) -> Self {
        Self::new(MetricKind::Counting, name, Some(value.into()))
    }
    pub fn gauge<S: Into<String>, V: Into<MetricValue>>(name: S, value: V) -> Self {
        Self::new(MetricKind::Gauge, name, Some(value.into()))
    }
    pub fn histogram<S: Into<String>, V: Into<MetricValue>>(name: S, value: V) -> Self {
        Self::new(MetricKind::Histogram, name, Some(value.into()))
    }
    pub fn set<S: Into<String>, V: Into<MetricValue>>(name: S, value: V) -> Self {
        Self::new(MetricKind::Set, name, Some(value.into()))
    }
    pub fn timing<S: Into<String>, V: Into<MetricValue>>(name: S, value: V) -> Self {
        Self::new(MetricKind::Timing, name, Some(value.into()))
    }
    pub fn with_rate<R: Into<Rate>>(self, rate: R) -> Self {
        Self {
            rate: Some(rate.into()),
            ..self
        }
    }
    /// Delta gauges render positive values with a leading `+`.
    pub fn delta(self, delta: bool) -> Self {
        Self { delta, ..self }
    }
    pub fn with_tags<T: Into<Tags>>(self, tags: T) -> Self {
        Self {
            tags: tags.into(),
            ..self
        }
    }
    pub fn get_kind(&self) -> MetricKind {
        self.kind
    }
    pub fn get_name(&self) -> &str {
        &self.name
    }
    pub fn get_value(&self) -> Option<&MetricValue> {
        self.value.as_ref()
    }
    pub fn get_rate(&self) -> Option<Rate> {
        self.rate
    }
    pub fn is_delta(&self) -> bool {
        self.delta
    }
    pub fn get_tags(&self) -> &Tags {
        &self.tags
    }
}

/// Calendar time, float epoch seconds or integer epoch seconds.
/// All three render as whole epoch seconds.
#[derive(Clone, Copy, Debug, PartialEq, From)]
pub enum Timestamp {
    DateTime(DateTime<Utc>),
    Epoch(f64),
    Unix(i64),
}

impl Timestamp {
    pub fn now() -> Self {
        Self::DateTime(Utc::now())
    }
    pub fn as_unix(&self) -> i64 {
        match self {
            Timestamp::DateTime(dt) => dt.timestamp(),
            Timestamp::Epoch(secs) => secs.trunc() as i64,
            Timestamp::Unix(secs) => *secs,
        }
    }
}

#[derive(Clone, Copy, Debug, Display, PartialEq, Eq, Hash)]
pub enum Priority {
    #[display("normal")]
    Normal,
    #[display("low")]
    Low,
}

#[derive(Clone, Copy, Debug, Display, PartialEq, Eq, Hash)]
pub enum AlertType {
    #[display("error")]
    Error,
    #[display("warning")]
    Warning,
    #[display("info")]
    Info,
    #[display("success")]
    Success,
}

/// An entry for the Datadog event stream.
///
/// Title and text are written to the wire exactly as given, so callers must
/// keep `|` and line breaks out of them.
#[derive(Clone, Debug, PartialEq)]
pub struct Event {
    pub(crate) title: String,
    pub(crate) text: String,
    pub(crate) date_happened: Option<Timestamp>,
    pub(crate) hostname: Option<String>,
    pub(crate) aggregation_key: Option<String>,
    pub(crate) priority: Option<Priority>,
    pub(crate) source_type_name: Option<String>,
    pub(crate) alert_type: Option<AlertType>,
    pub(crate) tags: Tags,
}

impl Event {
    pub fn new<S: Into<String>, T: Into<String>>(title: S, text: T) -> Self {
        Self {
            title: title.into(),
            text: text.into(),
            date_happened: None,
            hostname: None,
            aggregation_key: None,
            priority: None,
            source_type_name: None,
            alert_type: None,
            tags: Tags::default(),
        }
    }
    pub fn with_date<T: Into<Timestamp>>(mut self, date_happened: T) -> Self {
        self.date_happened = Some(date_happened.into());
        self
    }
    pub fn with_hostname<S: Into<String>>(mut self, hostname: S) -> Self {
        self.hostname = Some(hostname.into());
        self
    }
    pub fn with_aggregation_key<S: Into<String>>(mut self, aggregation_key: S) -> Self {
        self.aggregation_key = Some(aggregation_key.into());
        self
    }
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self
    }
    pub fn with_source_type<S: Into<String>>(mut self, source_type_name: S) -> Self {
        self.source_type_name = Some(source_type_name.into());
        self
    }
    pub fn with_alert_type(mut self, alert_type: AlertType) -> Self {
        self.alert_type = Some(alert_type);
        self
    }
    pub fn with_tags<T: Into<Tags>>(mut self, tags: T) -> Self {
        self.tags = tags.into();
        self
    }
    pub fn get_title(&self) -> &str {
        &self.title
    }
    pub fn get_text(&self) -> &str {
        &self.text
    }
    pub fn get_tags(&self) -> &Tags {
        &self.tags
    }
}

/// Service check status. The discriminant is the wire code.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Status {
    Ok = 0,
    Warning = 1,
    Critical = 2,
    Unknown = 3,
}

impl Status {
    pub fn code(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for Status {
    type Error = Error;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(Status::Ok),
            1 => Ok(Status::Warning),
            2 => Ok(Status::Critical),
            3 => Ok(Status::Unknown),
            other => Err(Error::InvalidStatus(other.to_string())),
        }
    }
}

impl FromStr for Status {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "0" | "ok" => Ok(Status::Ok),
            "1" | "warn" | "warning" => Ok(Status::Warning),
            "2" | "crit" | "critical" => Ok(Status::Critical),
            "3" | "unknown" => Ok(Status::Unknown),
            _ => Err(Error::InvalidStatus(s.to_string())),
        }
    }
}

impl TryFrom<&str> for Status {
    type Error = Error;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        s.parse()
    }
}

/// A Datadog service check.
#[derive(Clone, Debug, PartialEq)]
pub struct Check {
    pub(crate) name: String,
    pub(crate) status: Status,
    pub(crate) timestamp: Option<Timestamp>,
    pub(crate) hostname: Option<String>,
    pub(crate) tags: Tags,
    pub(crate) message: Option<String>,
}

impl Check {
    pub fn new<S: Into<String>>(name: S, status: Status) -> Self {
        Self {
            name: name.into(),
            status,
            timestamp: None,
            hostname: None,
            tags: Tags::default(),
            message: None,
        }
    }
    pub fn with_timestamp<T: Into<Timestamp>>(mut self, timestamp: T) -> Self {
        self.timestamp = Some(timestamp.into());
        self
    }
    pub fn with_hostname<S: Into<String>>(mut self, hostname: S) -> Self {
        self.hostname = Some(hostname.into());
        self
    }
    pub fn with_tags<T: Into<Tags>>(mut self, tags: T) -> Self {
        self.tags = tags.into();
        self
    }
    pub fn with_message<S: Into<String>>(mut self, message: S) -> Self {
        self.message = Some(message.into());
        self
    }
    pub fn get_name(&self) -> &str {
        &self.name
    }
    pub fn get_status(&self) -> Status {
        self.status
    }
}

/// Anything that can be queued and encoded to a single wire line.
#[derive(Clone, Debug, PartialEq, From)]
#[non_exhaustive]
pub enum Observation {
    Metric(Metric),
    Event(Event),
    Check(Check),
}

impl Observation {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Observation::Metric(metric) => metric.get_kind().name(),
            Observation::Event(_) => "event",
            Observation::Check(_) => "service check",
        }
    }
    pub fn as_metric(&self) -> Option<&Metric> {
        match self {
            Observation::Metric(metric) => Some(metric),
            _ => None,
        }
    }
}
