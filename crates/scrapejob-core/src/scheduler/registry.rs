//! Job-type registry: what runs for each [`JobType`].

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;

use crate::job::{JobContext, JobOutput};
use crate::store::{JobRecord, JobType};

type HandlerFn =
    Arc<dyn Fn(JobContext, serde_json::Value) -> BoxFuture<'static, anyhow::Result<JobOutput>> + Send + Sync>;

/// Execution function for a job type, plus the business event it emits and the external
/// hooks it drives.
#[derive(Clone)]
pub struct JobHandler {
    run: HandlerFn,
    event: Option<String>,
    hooks: Vec<String>,
}

impl std::fmt::Debug for JobHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobHandler")
            .field("event", &self.event)
            .field("hooks", &self.hooks)
            .finish()
    }
}

impl JobHandler {
    /// `f` receives the job context and the record's decoded arguments.
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn(JobContext, serde_json::Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<JobOutput>> + Send + 'static,
    {
        Self {
            run: Arc::new(move |ctx, args| Box::pin(f(ctx, args))),
            event: None,
            hooks: Vec::new(),
        }
    }

    /// Publish results on the business event bus under `event`.
    pub fn with_event(mut self, event: impl Into<String>) -> Self {
        self.event = Some(event.into());
        self
    }

    pub fn with_hooks<I, S>(mut self, hooks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.hooks.extend(hooks.into_iter().map(Into::into));
        self
    }

    pub fn event(&self) -> Option<&str> {
        self.event.as_deref()
    }

    pub fn hooks(&self) -> &[String] {
        &self.hooks
    }

    /// Start the handler for `record` in `ctx`.
    pub(crate) fn invoke(
        &self,
        ctx: JobContext,
        record: &JobRecord,
    ) -> BoxFuture<'static, anyhow::Result<JobOutput>> {
        for hook in &self.hooks {
            ctx.record_hook(hook);
        }
        (self.run)(ctx, decode_arguments(record.arguments.as_deref()))
    }
}

/// Arguments are stored as JSON text; anything else is passed through as a string.
fn decode_arguments(raw: Option<&str>) -> serde_json::Value {
    match raw {
        None => serde_json::Value::Null,
        Some(raw) => serde_json::from_str(raw)
            .unwrap_or_else(|_| serde_json::Value::String(raw.to_string())),
    }
}

#[derive(Debug, Clone, Default)]
pub struct JobRegistry {
    handlers: HashMap<JobType, JobHandler>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, job_type: JobType, handler: JobHandler) -> &mut Self {
        if self.handlers.insert(job_type, handler).is_some() {
            tracing::warn!(%job_type, "replacing job handler");
        }
        self
    }

    pub fn get(&self, job_type: JobType) -> Option<&JobHandler> {
        self.handlers.get(&job_type)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}
