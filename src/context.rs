//! Per-request context passed explicitly through every service call.

use tokio_util::sync::CancellationToken;

/// Identity and cancellation for one logical request. Cloning shares the
/// cancellation token.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub request_id: String,
    /// Caller identity as established by the outer authentication layer
    pub actor: Option<String>,
    cancel: CancellationToken,
}

impl RequestContext {
    pub fn new(actor: Option<String>) -> Self {
        Self {
            request_id: uuid::Uuid::new_v4().to_string(),
            actor,
            cancel: CancellationToken::new(),
        }
    }

    /// Context for work started by the process itself (batch ingest, jobs).
    pub fn system() -> Self {
        Self::new(Some("system".to_string()))
    }

    /// Tie this request to an externally owned cancellation token.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new(None)
    }
}
