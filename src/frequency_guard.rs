//! Frequency Guard: consults the Tracking Store to decide whether a
//! candidate database may be backed up again right now.

use std::time::Duration;

use chrono::Utc;

use crate::tracking::TrackingStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Allow,
    Prompt,
    Block,
}

pub struct FrequencyGuard<'a> {
    tracking: &'a TrackingStore,
}

impl<'a> FrequencyGuard<'a> {
    pub fn new(tracking: &'a TrackingStore) -> Self {
        Self { tracking }
    }

    /// `force` short-circuits to Allow regardless of recency. Absent that,
    /// no prior record is Allow; a record older than `min_interval` is
    /// Allow; otherwise Prompt, downgraded to Block in non-interactive mode.
    pub async fn decide(
        &self,
        database: &str,
        min_interval: Duration,
        force: bool,
        non_interactive: bool,
    ) -> Verdict {
        if force {
            return Verdict::Allow;
        }

        let Some(last) = self.tracking.last_backup(database).await else {
            return Verdict::Allow;
        };

        let elapsed = Utc::now().signed_duration_since(last);
        let min_interval = chrono::Duration::from_std(min_interval).unwrap_or_default();
        if elapsed >= min_interval {
            return Verdict::Allow;
        }

        if non_interactive {
            Verdict::Block
        } else {
            Verdict::Prompt
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    #[tokio::test]
    async fn no_record_allows() {
        let dir = tempfile::tempdir().unwrap();
        let store = TrackingStore::load(dir.path().join("t.json")).await.unwrap();
        let guard = FrequencyGuard::new(&store);
        let verdict = guard
            .decide("orders", Duration::from_secs(3600), false, true)
            .await;
        assert_eq!(verdict, Verdict::Allow);
    }

    #[tokio::test]
    async fn recent_record_blocks_in_non_interactive_mode() {
        let dir = tempfile::tempdir().unwrap();
        let store = TrackingStore::load(dir.path().join("t.json")).await.unwrap();
        store.record_success("orders", Utc::now()).await.unwrap();
        let guard = FrequencyGuard::new(&store);
        let verdict = guard
            .decide("orders", Duration::from_secs(3600), false, true)
            .await;
        assert_eq!(verdict, Verdict::Block);
    }

    #[tokio::test]
    async fn recent_record_prompts_in_interactive_mode() {
        let dir = tempfile::tempdir().unwrap();
        let store = TrackingStore::load(dir.path().join("t.json")).await.unwrap();
        store.record_success("orders", Utc::now()).await.unwrap();
        let guard = FrequencyGuard::new(&store);
        let verdict = guard
            .decide("orders", Duration::from_secs(3600), false, false)
            .await;
        assert_eq!(verdict, Verdict::Prompt);
    }

    #[tokio::test]
    async fn force_always_allows() {
        let dir = tempfile::tempdir().unwrap();
        let store = TrackingStore::load(dir.path().join("t.json")).await.unwrap();
        store.record_success("orders", Utc::now()).await.unwrap();
        let guard = FrequencyGuard::new(&store);
        let verdict = guard
            .decide("orders", Duration::from_secs(3600), true, true)
            .await;
        assert_eq!(verdict, Verdict::Allow);
    }

    #[tokio::test]
    async fn old_record_allows_again() {
        let dir = tempfile::tempdir().unwrap();
        let store = TrackingStore::load(dir.path().join("t.json")).await.unwrap();
        let old = Utc::now() - ChronoDuration::hours(2);
        store.record_success("orders", old).await.unwrap();
        let guard = FrequencyGuard::new(&store);
        let verdict = guard
            .decide("orders", Duration::from_secs(3600), false, true)
            .await;
        assert_eq!(verdict, Verdict::Allow);
    }
}
