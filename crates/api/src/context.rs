use tokio::time::Instant;

/// Per-request deadline derived from the `x-request-timeout-ms` header.
///
/// Inserted by [`crate::middleware::request_deadline`]; `None` when the client
/// sent no timeout, in which case only the configured DB timeout applies.
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestDeadline(Option<Instant>);

impl RequestDeadline {
    pub fn new(deadline: Option<Instant>) -> Self {
        Self(deadline)
    }

    pub fn instant(&self) -> Option<Instant> {
        self.0
    }
}
