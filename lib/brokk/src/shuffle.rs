use crate::api::{Group, MapReduce};
use crate::cell::PhaseCell;
use crate::progress::Stage;
use crate::runtime::JobCore;
use std::sync::atomic::Ordering;
use tracing::debug;

/// Drains every worker's sorted buffer into a sequence of key-equal groups.
///
/// Runs on the leader only, between the job's two barriers, which gives it
/// exclusive access to all buffers and the group list. The buffers are
/// sorted ascending, so the globally largest remaining key always sits at
/// the back of some buffer: each pass finds it, pops every pair carrying an
/// equal key across all buffers into one fresh group, and publishes the
/// group. Groups therefore come out in descending key order, and the whole
/// pass costs one back-of-buffer comparison per buffer per group plus one
/// move per pair.
pub(crate) fn shuffle<C: MapReduce>(core: &JobCore<C>) {
    // Exclusive through this function: every map worker released its buffer
    // at the first barrier.
    let mut buffers: Vec<&mut Group<C::Key, C::Value>> = core
        .buffers
        .iter()
        .map(|cell| unsafe { &mut *cell.get() })
        .collect();

    let pairs: usize = buffers.iter().map(|buffer| buffer.len()).sum();
    // One store publishes the stage together with the new denominator, so a
    // reader can never catch the shuffle stage against the map totals.
    core.progress.set_all(Stage::Shuffle, 0, pairs as u32);
    debug!(pairs, "shuffle starting");

    let groups = unsafe { &mut *core.groups.get() };

    loop {
        // Find the buffer whose back holds the largest remaining key.
        let mut max_at: Option<usize> = None;
        for (at, buffer) in buffers.iter().enumerate() {
            let Some((key, _)) = buffer.last() else { continue };
            let beats = match max_at {
                None => true,
                Some(best) => {
                    let (best_key, _) =
                        buffers[best].last().expect("tracked buffer cannot be empty");
                    best_key < key
                }
            };
            if beats {
                max_at = Some(at);
            }
        }
        let Some(max_at) = max_at else {
            break; // every buffer drained
        };

        let (pivot_key, pivot_value) = buffers[max_at]
            .pop()
            .expect("tracked buffer cannot be empty");

        // Pop every pair equal to the pivot; no buffer can hide one below a
        // smaller key, so checking backs is enough.
        let mut group: Group<C::Key, C::Value> = Vec::new();
        for buffer in buffers.iter_mut() {
            while buffer
                .last()
                .is_some_and(|(key, _)| key.cmp(&pivot_key).is_eq())
            {
                if let Some(pair) = buffer.pop() {
                    group.push(pair);
                    core.progress.add_processed();
                }
            }
        }
        group.push((pivot_key, pivot_value));
        core.progress.add_processed();

        groups.push(PhaseCell::new(group));
        core.group_count.fetch_add(1, Ordering::Relaxed);
    }
}
