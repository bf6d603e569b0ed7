//! Child-side supervision: a child keeps its disruption in place only while
//! its supervisor keeps sending heartbeats and the deadline has not passed.

use chrono::{DateTime, Utc};
use futures::prelude::*;
use tokio::time::{self, Duration, Instant};
use tracing::{debug, trace};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Watchdog {
    /// Interval at which the supervisor sends heartbeats. When unset, the
    /// supervisor is never considered lost.
    pub heartbeat: Option<Duration>,

    /// Number of consecutive heartbeats that may be missed.
    pub max_missed: u32,

    pub deadline: Option<DateTime<Utc>>,
}

/// Why a child stops disrupting its target.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Expiry {
    Terminated,
    SupervisorLost,
    DeadlineReached,
}

impl Watchdog {
    pub const DEFAULT_MAX_MISSED: u32 = 5;

    /// Time left before `deadline`, if any.
    pub fn until_deadline(&self, now: DateTime<Utc>) -> Option<Duration> {
        let deadline = self.deadline?;
        Some((deadline - now).to_std().unwrap_or(Duration::ZERO))
    }

    /// Waits until `shutdown` completes, heartbeats stop arriving, or the
    /// deadline passes.
    pub async fn run<H, S>(&self, heartbeats: H, shutdown: S) -> Expiry
    where
        H: Stream<Item = ()>,
        S: Future<Output = ()>,
    {
        tokio::pin!(heartbeats, shutdown);

        let until_deadline = self.until_deadline(Utc::now());
        let deadline = time::sleep(until_deadline.unwrap_or(Duration::MAX));
        tokio::pin!(deadline);

        let lease = self.heartbeat.map(|i| i * self.max_missed.max(1));
        let mut last_heartbeat = Instant::now();
        let mut heartbeats_ended = false;

        loop {
            let expiry = match lease {
                Some(lease) => time::sleep_until(last_heartbeat + lease),
                None => time::sleep(Duration::MAX),
            };
            tokio::select! {
                biased;

                () = &mut shutdown => return Expiry::Terminated,

                () = &mut deadline, if until_deadline.is_some() => {
                    debug!("Deadline reached");
                    return Expiry::DeadlineReached;
                }

                beat = heartbeats.next(), if !heartbeats_ended => match beat {
                    Some(()) => {
                        trace!("Heartbeat received");
                        last_heartbeat = Instant::now();
                    }
                    None => heartbeats_ended = true,
                },

                () = expiry, if lease.is_some() => {
                    debug!(?lease, "No heartbeat received from the supervisor");
                    return Expiry::SupervisorLost;
                }
            }
        }
    }
}

impl Default for Watchdog {
    fn default() -> Self {
        Self {
            heartbeat: Some(Duration::from_secs(1)),
            max_missed: Self::DEFAULT_MAX_MISSED,
            deadline: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::{future, stream};
    use tokio::sync::mpsc;
    use tokio_stream::wrappers::ReceiverStream;

    #[tokio::test(start_paused = true)]
    async fn supervisor_lost_without_heartbeats() {
        let watchdog = Watchdog::default();
        let start = Instant::now();
        let expiry = watchdog
            .run(stream::pending::<()>(), future::pending::<()>())
            .await;
        assert_eq!(expiry, Expiry::SupervisorLost);
        assert!(start.elapsed() >= Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn heartbeats_keep_child_alive_until_deadline() {
        let watchdog = Watchdog {
            deadline: Some(Utc::now() + chrono::Duration::seconds(30)),
            ..Default::default()
        };

        let (tx, rx) = mpsc::channel(1);
        tokio::spawn(async move {
            let mut ticks = time::interval(Duration::from_secs(1));
            loop {
                ticks.tick().await;
                if tx.send(()).await.is_err() {
                    return;
                }
            }
        });

        let expiry = watchdog
            .run(ReceiverStream::new(rx), future::pending::<()>())
            .await;
        assert_eq!(expiry, Expiry::DeadlineReached);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_wins() {
        let expiry = Watchdog::default()
            .run(stream::pending::<()>(), future::ready(()))
            .await;
        assert_eq!(expiry, Expiry::Terminated);
    }

    #[tokio::test(start_paused = true)]
    async fn heartbeats_may_be_disabled() {
        let watchdog = Watchdog {
            heartbeat: None,
            deadline: Some(Utc::now() + chrono::Duration::minutes(10)),
            ..Default::default()
        };
        let expiry = watchdog
            .run(stream::empty::<()>(), future::pending::<()>())
            .await;
        assert_eq!(expiry, Expiry::DeadlineReached);
    }

    #[test]
    fn past_deadline_is_immediate() {
        let now = Utc::now();
        let watchdog = Watchdog {
            deadline: Some(now - chrono::Duration::seconds(1)),
            ..Default::default()
        };
        assert_eq!(watchdog.until_deadline(now), Some(Duration::ZERO));
        assert_eq!(Watchdog::default().until_deadline(now), None);
    }
}
