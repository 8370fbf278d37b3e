use std::time::Duration;

use crate::config::PollingConfig;
use crate::models::JobStatus;

/// What the poll loop does after applying a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextPoll {
    After(Duration),
    Stop,
}

/// Maps a freshly observed status to the next poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub fast: Duration,
    pub idle: Duration,
}

impl PollPolicy {
    pub fn new(fast: Duration, idle: Duration) -> Self {
        Self { fast, idle }
    }

    pub fn next(&self, status: JobStatus) -> NextPoll {
        match status {
            JobStatus::Uploaded | JobStatus::Processing => NextPoll::After(self.fast),
            JobStatus::Completed | JobStatus::Failed => NextPoll::Stop,
            JobStatus::Unknown => NextPoll::After(self.idle),
        }
    }

    /// Delay after a failed poll: the last scheduled interval, or the fast
    /// one when nothing has been scheduled yet.
    pub fn retry_after(&self, last: Option<Duration>) -> Duration {
        last.unwrap_or(self.fast)
    }
}

impl Default for PollPolicy {
    fn default() -> Self {
        PollPolicy::from(&PollingConfig::default())
    }
}

impl From<&PollingConfig> for PollPolicy {
    fn from(config: &PollingConfig) -> Self {
        Self::new(
            Duration::from_millis(config.fast_interval_ms),
            Duration::from_millis(config.idle_interval_ms),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intervals_by_status() {
        let policy = PollPolicy::default();
        assert_eq!(
            policy.next(JobStatus::Uploaded),
            NextPoll::After(Duration::from_millis(1000))
        );
        assert_eq!(
            policy.next(JobStatus::Processing),
            NextPoll::After(Duration::from_millis(1000))
        );
        assert_eq!(policy.next(JobStatus::Completed), NextPoll::Stop);
        assert_eq!(policy.next(JobStatus::Failed), NextPoll::Stop);
        assert_eq!(
            policy.next(JobStatus::Unknown),
            NextPoll::After(Duration::from_millis(5000))
        );
    }

    #[test]
    fn test_retry_reuses_last_interval() {
        let policy = PollPolicy::new(Duration::from_millis(200), Duration::from_secs(3));
        assert_eq!(policy.retry_after(None), Duration::from_millis(200));
        assert_eq!(
            policy.retry_after(Some(Duration::from_secs(3))),
            Duration::from_secs(3)
        );
    }
}
