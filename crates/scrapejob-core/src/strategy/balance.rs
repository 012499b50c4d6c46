//! Host-balanced candidate selection.

use std::collections::VecDeque;

use crate::store::JobRecord;

/// Pick up to `slots` jobs from `available`, one at a time from whichever request-queue key
/// currently has the fewest jobs (in flight plus already picked).
///
/// Keys are visited in first-seen order (`current` first, then `available`), so ties go to
/// the earliest key. Within a key, `available` order is kept.
pub fn balance_by_queue_key(
    current: &[JobRecord],
    available: Vec<JobRecord>,
    slots: usize,
) -> Vec<JobRecord> {
    let mut groups: Vec<KeyGroup> = Vec::new();

    for record in current {
        group_for(&mut groups, record.queue_key()).load += 1;
    }
    for record in available {
        group_for(&mut groups, record.queue_key())
            .pending
            .push_back(record);
    }

    let mut picked = Vec::with_capacity(slots);
    for _ in 0..slots {
        let Some(group) = groups
            .iter_mut()
            .filter(|g| !g.pending.is_empty())
            .min_by_key(|g| g.load)
        else {
            break;
        };
        if let Some(record) = group.pending.pop_front() {
            group.load += 1;
            picked.push(record);
        }
    }

    tracing::debug!(
        slots,
        picked = picked.len(),
        distribution = ?groups.iter().map(|g| (g.key.as_str(), g.load)).collect::<Vec<_>>(),
        "balanced jobs across request queues"
    );
    picked
}

struct KeyGroup {
    key: String,
    load: usize,
    pending: VecDeque<JobRecord>,
}

fn group_for(groups: &mut Vec<KeyGroup>, key: String) -> &mut KeyGroup {
    let idx = match groups.iter().position(|g| g.key == key) {
        Some(idx) => idx,
        None => {
            groups.push(KeyGroup {
                key,
                load: 0,
                pending: VecDeque::new(),
            });
            groups.len() - 1
        }
    };
    &mut groups[idx]
}
