use byte_channels::SinkFactory;
use byte_common::{Result, Turn};
use byte_db::{ActivityRecord, ActivityStore};
use chrono::{DateTime, Utc};
use rand::Rng;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::backoff::{BackoffController, CycleContext};
use crate::gate::ConversationGate;
use crate::relay::{RelayPolicy, StreamingRelay};

/// Pick the next nudge time uniformly between `min_days` and `max_days`
/// from `now`.
pub fn next_nudge_at(now: DateTime<Utc>, min_days: f64, max_days: f64) -> DateTime<Utc> {
    let (low, high) = if min_days <= max_days {
        (min_days, max_days)
    } else {
        (max_days, min_days)
    };
    let days = if low == high {
        low
    } else {
        rand::rng().random_range(low..=high)
    };
    let secs = (days.max(0.0) * 86_400.0) as i64;
    now + chrono::Duration::seconds(secs)
}

fn nudge_turn(is_direct: bool, now: DateTime<Utc>) -> Turn {
    let now = now.format("%Y-%m-%d %H:%M:%S");
    if is_direct {
        Turn::system(format!(
            "The user hasn't sent you a message in a while. Send them a nice message to get them back into the conversation, or just continue the conversation yourself and await their return. Take into account the time of their last message, as the current time is now {now} UTC."
        ))
    } else {
        Turn::function(
            "inactive_channel",
            format!(
                "Generate an engaging message to revive an inactive Discord server conversation and encourage user participation. You can mention things previously in the conversation, bring up previous users or topics, or mention things about yourself. Keep time of the last message in mind. The current time of this message is {now} UTC."
            ),
        )
    }
}

/// Periodically nudges conversations that have gone quiet.
pub struct ReengageScheduler {
    activity: Arc<ActivityStore>,
    gate: Arc<ConversationGate>,
    backoff: Arc<BackoffController>,
    sinks: Arc<dyn SinkFactory>,
    policy: RelayPolicy,
    min_days: f64,
    max_days: f64,
    poll_interval: Duration,
    scratch_dir: PathBuf,
}

impl ReengageScheduler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        activity: Arc<ActivityStore>,
        gate: Arc<ConversationGate>,
        backoff: Arc<BackoffController>,
        sinks: Arc<dyn SinkFactory>,
        policy: RelayPolicy,
        min_days: f64,
        max_days: f64,
        poll_interval: Duration,
    ) -> Self {
        Self {
            activity,
            gate,
            backoff,
            sinks,
            policy,
            min_days,
            max_days,
            poll_interval,
            scratch_dir: std::env::temp_dir(),
        }
    }

    pub fn with_scratch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.scratch_dir = dir.into();
        self
    }

    /// Poll forever in a background task.
    pub fn spawn(self: &Arc<Self>) -> JoinHandle<()> {
        let scheduler = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(scheduler.poll_interval);
            loop {
                interval.tick().await;
                match scheduler.run_due(Utc::now()).await {
                    Ok(0) => {}
                    Ok(n) => info!("sent {n} re-engagement messages"),
                    Err(e) => warn!("re-engagement poll failed: {e}"),
                }
            }
        })
    }

    /// Nudge every conversation due at `now`. Returns how many were sent.
    pub async fn run_due(&self, now: DateTime<Utc>) -> Result<usize> {
        let due = self.activity.due(now).await?;
        let mut sent = 0;
        for record in due {
            if self.nudge(&record, now).await? {
                sent += 1;
            }
        }
        Ok(sent)
    }

    async fn nudge(&self, record: &ActivityRecord, now: DateTime<Utc>) -> Result<bool> {
        let key = &record.conversation;
        let Ok(_guard) = self.gate.try_acquire(key) else {
            debug!(conversation = %key, "conversation busy, nudge deferred");
            return Ok(false);
        };

        let store = self.backoff.store();
        if store.get(key).await?.is_none() {
            info!(conversation = %key, "conversation no longer exists, dropping schedule");
            self.activity.remove(key).await?;
            return Ok(false);
        }

        let next = next_nudge_at(now, self.min_days, self.max_days);
        let sink = match self.sinks.sink_for(&record.channel_id) {
            Ok(sink) => sink,
            Err(e) => {
                warn!(conversation = %key, "no channel for nudge: {e}");
                self.activity.reschedule(key, next).await?;
                return Ok(false);
            }
        };

        store
            .append(key, &[nudge_turn(record.is_direct, now)])
            .await?;

        let ctx = CycleContext {
            sink: sink.as_ref(),
            status: None,
            inbound: None,
            is_direct: record.is_direct,
            announce_failures: false,
        };

        let delivered = match self.backoff.call(key, &[], &ctx).await {
            Ok(stream) => {
                let outcome = StreamingRelay::new(sink.as_ref(), &self.policy, None)
                    .file_label(key.as_str())
                    .scratch_dir(&self.scratch_dir)
                    .relay(stream)
                    .await;
                if outcome.text.is_empty() {
                    false
                } else {
                    store.append(key, &[Turn::assistant(outcome.text)]).await?;
                    true
                }
            }
            Err(e) => {
                warn!(conversation = %key, "re-engagement call failed: {e}");
                false
            }
        };

        self.activity.reschedule(key, next).await?;
        Ok(delivered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use byte_common::Role;
    use chrono::TimeZone;

    #[test]
    fn next_nudge_stays_in_window() {
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        for _ in 0..50 {
            let next = next_nudge_at(now, 2.0, 4.0);
            assert!(next >= now + chrono::Duration::days(2));
            assert!(next <= now + chrono::Duration::days(4));
        }
        assert_eq!(
            next_nudge_at(now, 1.0, 1.0),
            now + chrono::Duration::days(1)
        );
    }

    #[test]
    fn nudge_turn_depends_on_context() {
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let dm = nudge_turn(true, now);
        assert_eq!(dm.role, Role::System);
        assert!(dm.content.ends_with("2024-03-01 12:00:00 UTC."));

        let guild = nudge_turn(false, now);
        assert_eq!(guild.role, Role::Function);
        assert_eq!(guild.name.as_deref(), Some("inactive_channel"));
    }
}
