//! Serial event dispatch.
//!
//! Events arrive from signals, the update-status ticker and the HTTP
//! surface. They are queued and handled one at a time so two reconciles
//! never race on the artifact.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::operator::Operator;
use crate::workload::WorkloadControl;

/// Lifecycle and relation events that trigger a reconcile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Event {
    Startup,
    ConfigChanged,
    RelationChanged,
    UpdateStatus,
    Upgrade,
}

impl Event {
    pub fn as_str(&self) -> &'static str {
        match self {
            Event::Startup => "startup",
            Event::ConfigChanged => "config-changed",
            Event::RelationChanged => "relation-changed",
            Event::UpdateStatus => "update-status",
            Event::Upgrade => "upgrade",
        }
    }

    /// Whether handling this event also refreshes the workload version.
    pub fn refreshes_version(&self) -> bool {
        matches!(self, Event::Startup | Event::UpdateStatus | Event::Upgrade)
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Event {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "startup" => Ok(Event::Startup),
            "config-changed" => Ok(Event::ConfigChanged),
            "relation-changed" => Ok(Event::RelationChanged),
            "update-status" => Ok(Event::UpdateStatus),
            "upgrade" => Ok(Event::Upgrade),
            other => Err(format!("unknown event '{}'", other)),
        }
    }
}

/// Handle for queueing events.
#[derive(Debug, Clone)]
pub struct EventSender {
    tx: mpsc::Sender<Event>,
}

impl EventSender {
    /// Queue an event, waiting for room if the queue is full.
    pub async fn send(&self, event: Event) -> bool {
        self.tx.send(event).await.is_ok()
    }

    /// Queue an event without waiting. Returns false if it was dropped.
    pub fn try_send(&self, event: Event) -> bool {
        match self.tx.try_send(event) {
            Ok(()) => true,
            Err(e) => {
                warn!(event = %event, error = %e, "Dropping event");
                false
            }
        }
    }
}

/// Create an event queue with room for `capacity` pending events.
pub fn channel(capacity: usize) -> (EventSender, mpsc::Receiver<Event>) {
    let (tx, rx) = mpsc::channel(capacity);
    (EventSender { tx }, rx)
}

/// Drains the event queue into the operator.
pub struct Dispatcher<W: WorkloadControl> {
    operator: Arc<Operator<W>>,
    events: mpsc::Receiver<Event>,
}

impl<W: WorkloadControl> Dispatcher<W> {
    pub fn new(operator: Arc<Operator<W>>, events: mpsc::Receiver<Event>) -> Self {
        Self { operator, events }
    }

    /// Handle events until shutdown or until every sender is gone.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!("Event dispatcher started");

        loop {
            tokio::select! {
                event = self.events.recv() => {
                    let Some(event) = event else {
                        debug!("Event queue closed");
                        break;
                    };
                    self.operator.reconcile(event).await;
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("Event dispatcher stopped");
    }
}

/// Queue an update-status event every `period` until shutdown.
pub async fn update_status_ticker(
    events: EventSender,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut interval = tokio::time::interval(period);
    // The first tick completes immediately; startup already reconciles.
    interval.tick().await;

    loop {
        tokio::select! {
            _ = interval.tick() => {
                events.try_send(Event::UpdateStatus);
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    break;
                }
            }
        }
    }
}

/// Queue a config-changed event on every SIGHUP until shutdown.
#[cfg(unix)]
pub async fn hangup_listener(
    events: EventSender,
    mut shutdown: watch::Receiver<bool>,
) -> std::io::Result<()> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut hangup = signal(SignalKind::hangup())?;

    loop {
        tokio::select! {
            received = hangup.recv() => {
                if received.is_none() {
                    break;
                }
                info!("Received SIGHUP, reloading inputs");
                events.try_send(Event::ConfigChanged);
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    break;
                }
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_names() {
        for event in [
            Event::Startup,
            Event::ConfigChanged,
            Event::RelationChanged,
            Event::UpdateStatus,
            Event::Upgrade,
        ] {
            assert_eq!(event.as_str().parse::<Event>().unwrap(), event);
            assert_eq!(
                serde_json::to_string(&event).unwrap(),
                format!("\"{}\"", event)
            );
        }
        assert!("install".parse::<Event>().is_err());
    }

    #[test]
    fn test_try_send_full_queue() {
        let (events, mut rx) = channel(1);
        assert!(events.try_send(Event::ConfigChanged));
        assert!(!events.try_send(Event::RelationChanged));
        assert_eq!(rx.try_recv().unwrap(), Event::ConfigChanged);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticker_sends_update_status() {
        let (events, mut rx) = channel(4);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let ticker = tokio::spawn(update_status_ticker(
            events,
            Duration::from_secs(300),
            shutdown_rx,
        ));

        tokio::time::advance(Duration::from_secs(301)).await;
        assert_eq!(rx.recv().await, Some(Event::UpdateStatus));

        shutdown_tx.send(true).unwrap();
        ticker.await.unwrap();
    }
}
