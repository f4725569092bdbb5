use std::{
    future::Future,
    time::{Duration, Instant},
};

use crate::{
    client::Client,
    metric::{Metric, Observation, Rate, Tags},
};

/// Records how long a unit of work took as a timing metric, in whole
/// milliseconds.
///
/// ```no_run
/// # use measures::Client;
/// # fn example(client: &Client) {
/// let result = client.timer("db.query").time(|| 40 + 2);
///
/// {
///     let _guard = client.timer("request").start();
///     // the timing is registered when the guard drops, even while unwinding
/// }
/// # }
/// ```
#[derive(Clone)]
pub struct Timer {
    client: Client,
    name: String,
    rate: Option<Rate>,
    tags: Tags,
}

impl Timer {
    pub(crate) fn new<S: Into<String>>(client: Client, name: S) -> Self {
        Self {
            client,
            name: name.into(),
            rate: None,
            tags: Tags::default(),
        }
    }
    pub fn with_rate<R: Into<Rate>>(self, rate: R) -> Self {
        Self {
            rate: Some(rate.into()),
            ..self
        }
    }
    pub fn with_tags<T: Into<Tags>>(self, tags: T) -> Self {
        Self {
            tags: tags.into(),
            ..self
        }
    }
    pub fn start(self) -> TimerGuard {
        TimerGuard {
            timer: self,
            started: Instant::now(),
            stopped: false,
        }
    }
    pub fn time<T, F: FnOnce() -> T>(self, f: F) -> T {
        let _guard = self.start();
        f()
    }
    /// Dropping the future before it completes still records the time spent.
    pub async fn time_future<T, F: Future<Output = T>>(self, f: F) -> T {
        let _guard = self.start();
        f.await
    }
    fn record(&self, elapsed: Duration) -> Observation {
        let millis = i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX);
        let mut metric = Metric::timing(self.name.clone(), millis).with_tags(self.tags.clone());
        if let Some(rate) = self.rate {
            metric = metric.with_rate(rate);
        }
        self.client.register(metric)
    }
}

/// Running timer. Registers its timing on [TimerGuard::stop] or on drop,
/// whichever happens first.
pub struct TimerGuard {
    timer: Timer,
    started: Instant,
    stopped: bool,
}

impl TimerGuard {
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
    pub fn stop(mut self) -> Observation {
        self.stopped = true;
        self.timer.record(self.started.elapsed())
    }
}

impl Drop for TimerGuard {
    fn drop(&mut self) {
        if !self.stopped {
            self.stopped = true;
            self.timer.record(self.started.elapsed());
        }
    }
}

#[cfg(test)]
mod test {
    use std::panic::{catch_unwind, AssertUnwindSafe};

    use super::*;
    use crate::{
        client::{idle_handle, ClientConfig},
        metric::{MetricKind, MetricValue},
    };

    fn client() -> Client {
        let config = ClientConfig::new(":9").expect("Failed to build config!");
        Client::new(config, idle_handle())
    }

    fn millis(observation: &Observation) -> i64 {
        let metric = observation.as_metric().expect("Timer should record a metric");
        assert_eq!(metric.get_kind(), MetricKind::Timing);
        match metric.get_value() {
            Some(MetricValue::Int(ms)) => *ms,
            other => panic!("unexpected timing value {other:?}"),
        }
    }

    #[test]
    fn test_stop_records_elapsed_millis() {
        let client = client();
        let guard = client.timer("work").with_rate(0.5).with_tags(["step:one"]).start();
        std::thread::sleep(Duration::from_millis(20));
        let observation = guard.stop();
        assert!(millis(&observation) >= 20);
        let metric = observation.as_metric().unwrap();
        assert_eq!(metric.get_name(), "work");
        assert_eq!(metric.get_rate(), Some(Rate::Probability(0.5)));
        assert_eq!(metric.get_tags().iter().collect::<Vec<_>>(), vec!["step:one"]);
        // stop consumed the guard, nothing is registered twice
        assert_eq!(client.pending(), 1);
    }

    #[test]
    fn test_guard_records_on_drop() {
        let client = client();
        {
            let _guard = client.timer("scoped").start();
        }
        assert_eq!(client.pending(), 1);
        assert_eq!(client.timer("closure").time(|| 5), 5);
        assert_eq!(client.pending(), 2);
    }

    #[test]
    fn test_guard_records_while_unwinding() {
        let client = client();
        let timer = client.timer("failing");
        let result = catch_unwind(AssertUnwindSafe(|| timer.time(|| panic!("boom"))));
        assert!(result.is_err());
        assert_eq!(client.pending(), 1);
    }

    #[tokio::test]
    async fn test_time_future() {
        let client = client();
        let value = client
            .timer("sleepy")
            .time_future(async {
                tokio::time::sleep(Duration::from_millis(10)).await;
                7
            })
            .await;
        assert_eq!(value, 7);
        assert_eq!(client.pending(), 1);
    }
}
