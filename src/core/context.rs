/// Per-call execution context passed down through the persistence pipeline.
///
/// Carries the acting user and whether optimistic-concurrency conflicts
/// should be raised or only logged. Trusted internal operations run with
/// checking switched off.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionContext {
    pub user: String,
    pub concurrency_checking: bool,
}

impl ExecutionContext {
    pub fn new(user: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            concurrency_checking: true,
        }
    }

    /// Context for system operations; conflicts are logged, not raised.
    pub fn system() -> Self {
        Self::new("__system").without_concurrency_checking()
    }

    pub fn without_concurrency_checking(mut self) -> Self {
        self.concurrency_checking = false;
        self
    }

    pub fn with_concurrency_checking(mut self, enabled: bool) -> Self {
        self.concurrency_checking = enabled;
        self
    }
}
