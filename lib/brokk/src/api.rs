use crate::progress::Stage;

/// Completion percentage reported once a stage (or the whole job) is done.
pub const MAX_PERCENTAGE: f32 = 100.0;

/// A run of intermediate pairs whose keys all compare equal. Built by the
/// shuffle pass, consumed whole by a single `do_reduce` call, which owns it.
pub type Group<K, V> = Vec<(K, V)>;

/// Point-in-time view of a running job, as returned by
/// [`JobHandle::state`](crate::runtime::JobHandle::state).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JobState {
    pub stage: Stage,
    pub percentage: f32,
}

/// A map/reduce pair the engine runs over an input sequence.
///
/// The engine calls `do_map` concurrently on disjoint input pairs and
/// `do_reduce` concurrently on disjoint groups, so both must be reentrant
/// across threads. Intermediate key equality is derived from `Ord`: two keys
/// belong to the same group iff `a.cmp(&b)` is `Equal`.
pub trait MapReduce: Send + Sync + 'static {
    type InputKey: Send + Sync + 'static;
    type InputValue: Send + Sync + 'static;
    type Key: Ord + Send + 'static;
    type Value: Send + 'static;
    type OutputKey: Send + 'static;
    type OutputValue: Send + 'static;

    /// Maps one input pair, emitting any number of intermediate pairs.
    fn do_map<F>(&self, key: &Self::InputKey, value: &Self::InputValue, emit: &mut F)
    where
        F: FnMut(Self::Key, Self::Value);

    /// Reduces one key-equal group, emitting any number of output pairs.
    /// The group is moved in; dropping or consuming it finalises the pairs.
    fn do_reduce<F>(&self, group: Group<Self::Key, Self::Value>, emit: &mut F)
    where
        F: FnMut(Self::OutputKey, Self::OutputValue);
}
