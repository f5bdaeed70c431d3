//! Per-call context handed to the core services

use std::time::Duration;
use uuid::Uuid;

/// Who is acting and how long the operation may take
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestContext {
    pub actor_id: Uuid,
    pub timeout: Duration,
}

impl RequestContext {
    pub fn new(actor_id: Uuid, timeout: Duration) -> Self {
        Self { actor_id, timeout }
    }

    /// Shorten the deadline; a longer one than the current is ignored
    pub fn with_deadline(self, requested: Duration) -> Self {
        Self {
            timeout: self.timeout.min(requested),
            ..self
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deadline_is_clamped() {
        let ctx = RequestContext::new(Uuid::new_v4(), Duration::from_millis(5000));
        assert_eq!(
            ctx.with_deadline(Duration::from_millis(200)).timeout,
            Duration::from_millis(200)
        );
        assert_eq!(
            ctx.with_deadline(Duration::from_secs(60)).timeout,
            Duration::from_millis(5000)
        );
    }
}
