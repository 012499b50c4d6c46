//! Fire-once lifecycle listeners (`before`, `after`, `done`).

use std::sync::Arc;

use futures::future::{join_all, BoxFuture};

use super::JobOutcome;

pub type HookFuture = BoxFuture<'static, anyhow::Result<()>>;

type Hook = Box<dyn FnOnce() -> HookFuture + Send>;
type DoneHook = Box<dyn FnOnce(Arc<JobOutcome>) -> HookFuture + Send>;

/// Handle for removing a listener before it fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListenerId(u64);

#[derive(Default)]
pub(super) struct Listeners {
    next_id: u64,
    before: Vec<(ListenerId, Hook)>,
    after: Vec<(ListenerId, Hook)>,
    done: Vec<(ListenerId, DoneHook)>,
}

impl Listeners {
    fn id(&mut self) -> ListenerId {
        self.next_id += 1;
        ListenerId(self.next_id)
    }

    pub(super) fn add_before(&mut self, hook: Hook) -> ListenerId {
        let id = self.id();
        self.before.push((id, hook));
        id
    }

    pub(super) fn add_after(&mut self, hook: Hook) -> ListenerId {
        let id = self.id();
        self.after.push((id, hook));
        id
    }

    pub(super) fn add_done(&mut self, hook: DoneHook) -> ListenerId {
        let id = self.id();
        self.done.push((id, hook));
        id
    }

    pub(super) fn remove(&mut self, id: ListenerId) -> bool {
        let before = self.before.len() + self.after.len() + self.done.len();
        self.before.retain(|(i, _)| *i != id);
        self.after.retain(|(i, _)| *i != id);
        self.done.retain(|(i, _)| *i != id);
        before != self.before.len() + self.after.len() + self.done.len()
    }

    pub(super) fn take_before(&mut self) -> Vec<Hook> {
        std::mem::take(&mut self.before)
            .into_iter()
            .map(|(_, h)| h)
            .collect()
    }

    pub(super) fn take_after(&mut self) -> Vec<Hook> {
        std::mem::take(&mut self.after)
            .into_iter()
            .map(|(_, h)| h)
            .collect()
    }

    pub(super) fn take_done(&mut self) -> Vec<DoneHook> {
        std::mem::take(&mut self.done)
            .into_iter()
            .map(|(_, h)| h)
            .collect()
    }
}

/// Run all futures concurrently; a failing listener is logged and does not stop the others.
pub(super) async fn run_all(event: &'static str, label: &str, futures: Vec<HookFuture>) {
    if futures.is_empty() {
        return;
    }
    for result in join_all(futures).await {
        if let Err(e) = result {
            tracing::error!(job = %label, event, "job listener failed: {:#}", e);
        }
    }
}
