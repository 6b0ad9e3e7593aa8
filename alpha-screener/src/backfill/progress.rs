//! Typed progress events published by the round loop.

use serde::Serialize;
use tokio::sync::mpsc::UnboundedSender;

use super::StopReason;

/// Progress of a backfill run.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ProgressEvent {
    RoundStarted {
        round: u32,
        pending: usize,
    },
    TickerEnriched {
        round: u32,
        symbol: String,
    },
    TickerFailed {
        round: u32,
        symbol: String,
        error: String,
        excluded: bool,
    },
    RoundCompleted {
        round: u32,
        ok: usize,
        pending: usize,
        budget_used: u64,
    },
    BudgetExhausted {
        round: u32,
        used: u64,
        cap: u64,
    },
    Finished {
        rounds: u32,
        reason: StopReason,
    },
}

pub type ProgressSender = UnboundedSender<ProgressEvent>;

/// Send an event if anyone is listening. A dropped receiver is not an error.
pub(crate) fn publish(sender: Option<&ProgressSender>, event: ProgressEvent) {
    if let Some(tx) = sender {
        let _ = tx.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[test]
    fn test_publish_without_receiver_is_silent() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        publish(Some(&tx), ProgressEvent::RoundStarted { round: 1, pending: 3 });
        publish(None, ProgressEvent::RoundStarted { round: 1, pending: 3 });
    }

    #[test]
    fn test_event_serialization() {
        let event = ProgressEvent::Finished {
            rounds: 2,
            reason: StopReason::Converged,
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["event"], "finished");
        assert_eq!(value["reason"], "CONVERGED");
    }
}
