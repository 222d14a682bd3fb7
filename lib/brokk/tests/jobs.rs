use brokk::{start_job, Group, JobState, MapReduce, Stage, MAX_PERCENTAGE};
use std::collections::HashMap;
use std::thread;

/// Counts byte occurrences: map tallies one string, reduce sums per byte.
struct ByteTally;

impl MapReduce for ByteTally {
    type InputKey = ();
    type InputValue = String;
    type Key = u8;
    type Value = u32;
    type OutputKey = u8;
    type OutputValue = u32;

    fn do_map<F>(&self, _key: &(), value: &String, emit: &mut F)
    where
        F: FnMut(u8, u32),
    {
        let mut counts = [0u32; 256];
        for byte in value.bytes() {
            counts[byte as usize] += 1;
        }
        for (byte, &count) in counts.iter().enumerate() {
            if count > 0 {
                emit(byte as u8, count);
            }
        }
    }

    fn do_reduce<F>(&self, group: Group<u8, u32>, emit: &mut F)
    where
        F: FnMut(u8, u32),
    {
        let byte = group[0].0;
        assert!(
            group.iter().all(|(key, _)| *key == byte),
            "group mixes keys"
        );
        emit(byte, group.iter().map(|(_, count)| count).sum());
    }
}

/// Buckets input indices by `index % modulus`; reduce reports the bucket's
/// size alongside its summed count.
struct ModTally {
    modulus: usize,
}

impl MapReduce for ModTally {
    type InputKey = usize;
    type InputValue = ();
    type Key = usize;
    type Value = u32;
    type OutputKey = usize;
    type OutputValue = (usize, u32);

    fn do_map<F>(&self, key: &usize, _value: &(), emit: &mut F)
    where
        F: FnMut(usize, u32),
    {
        emit(key % self.modulus, 1);
    }

    fn do_reduce<F>(&self, group: Group<usize, u32>, emit: &mut F)
    where
        F: FnMut(usize, (usize, u32)),
    {
        let key = group[0].0;
        assert!(group.iter().all(|(k, _)| *k == key), "group mixes keys");
        let sum = group.iter().map(|(_, count)| count).sum();
        emit(key, (group.len(), sum));
    }
}

fn sample_strings() -> Vec<((), String)> {
    [
        "This string is full of characters",
        "Multithreading is awesome",
        "race conditions are bad",
    ]
    .into_iter()
    .map(|line| ((), line.to_string()))
    .collect()
}

fn byte_frequencies(input: &[((), String)]) -> HashMap<u8, u32> {
    let mut expected = HashMap::new();
    for (_, line) in input {
        for byte in line.bytes() {
            *expected.entry(byte).or_insert(0) += 1;
        }
    }
    expected
}

fn is_done(state: JobState) -> bool {
    state.stage == Stage::Reduce && state.percentage >= MAX_PERCENTAGE
}

/// Asserts the successor state is reachable from the predecessor: stages
/// never regress, and within one stage the percentage never shrinks.
fn assert_moves_forward(previous: JobState, next: JobState) {
    assert!(
        next.stage >= previous.stage,
        "stage regressed: {previous:?} -> {next:?}"
    );
    if next.stage == previous.stage {
        assert!(
            next.percentage >= previous.percentage,
            "percentage regressed: {previous:?} -> {next:?}"
        );
    }
    assert!((0.0..=MAX_PERCENTAGE).contains(&next.percentage));
}

#[test]
fn empty_input_reports_complete() {
    let job = start_job(ByteTally, Vec::new(), 4).unwrap();
    let state = job.state();
    assert_eq!(state.stage, Stage::Reduce);
    assert_eq!(state.percentage, MAX_PERCENTAGE);
    job.wait();
    assert!(job.close().is_empty());
}

#[test]
fn zero_workers_is_rejected() {
    assert!(start_job(ByteTally, sample_strings(), 0).is_err());
}

#[test]
fn byte_counts_match_sequential_reference() {
    let input = sample_strings();
    let expected = byte_frequencies(&input);

    let job = start_job(ByteTally, input, 4).unwrap();
    job.wait();
    assert!(is_done(job.state()));

    let output: HashMap<u8, u32> = job.close().into_iter().collect();
    assert_eq!(output, expected);
}

#[test]
fn single_pair_single_worker_runs_all_phases() {
    let job = start_job(ModTally { modulus: 10 }, vec![(7, ())], 1).unwrap();
    let output = job.close();
    assert_eq!(output, vec![(7, (1, 1))]);
}

#[test]
fn keys_group_into_equal_sized_buckets() {
    let input: Vec<_> = (0..1000).map(|index| (index, ())).collect();
    let job = start_job(ModTally { modulus: 10 }, input, 4).unwrap();
    let output = job.close();

    assert_eq!(output.len(), 10);
    for (key, (size, sum)) in output {
        assert!(key < 10);
        assert_eq!(size, 100, "bucket {key} has the wrong size");
        assert_eq!(sum, 100);
    }
}

#[test]
fn more_workers_than_inputs_is_fine() {
    let input: Vec<_> = (0..2).map(|index| (index, ())).collect();
    let job = start_job(ModTally { modulus: 10 }, input, 8).unwrap();
    let mut output = job.close();
    output.sort_unstable();
    assert_eq!(output, vec![(0, (1, 1)), (1, (1, 1))]);
}

#[test]
fn single_worker_reduces_groups_in_descending_key_order() {
    // With one worker the output order is the group order, which the
    // shuffle produces largest key first.
    let input: Vec<_> = (0..20).map(|index| (index, ())).collect();
    let job = start_job(ModTally { modulus: 1000 }, input, 1).unwrap();
    let output = job.close();

    assert_eq!(output.len(), 20);
    for window in output.windows(2) {
        assert!(
            window[0].0 > window[1].0,
            "groups out of order: {} before {}",
            window[0].0,
            window[1].0
        );
    }
}

#[test]
fn wait_is_idempotent() {
    let job = start_job(ByteTally, sample_strings(), 4).unwrap();
    job.wait();
    job.wait();
    assert!(is_done(job.state()));
    assert!(!job.close().is_empty());
}

#[test]
fn concurrent_observers_and_waiters_agree() {
    let input = sample_strings();
    let expected = byte_frequencies(&input);
    let job = start_job(ByteTally, input, 4).unwrap();

    thread::scope(|scope| {
        for _ in 0..2 {
            scope.spawn(|| {
                let mut previous = job.state();
                while !is_done(previous) {
                    let next = job.state();
                    assert_moves_forward(previous, next);
                    previous = next;
                    thread::yield_now();
                }
            });
        }
        for _ in 0..3 {
            scope.spawn(|| {
                job.wait();
                assert!(is_done(job.state()));
            });
        }
    });

    let output: HashMap<u8, u32> = job.close().into_iter().collect();
    assert_eq!(output, expected);
}

#[test]
fn progress_only_moves_forward_under_load() {
    let input: Vec<_> = (0..100_000).map(|index| (index, ())).collect();
    let job = start_job(ModTally { modulus: 50 }, input, 8).unwrap();

    thread::scope(|scope| {
        scope.spawn(|| {
            let mut previous = job.state();
            while !is_done(previous) {
                let next = job.state();
                assert_moves_forward(previous, next);
                previous = next;
                thread::yield_now();
            }
        });
        scope.spawn(|| job.wait());
    });

    let output = job.close();
    assert_eq!(output.len(), 50);
    for (_, (size, sum)) in output {
        assert_eq!(size, 2000);
        assert_eq!(sum, 2000);
    }
}

#[test]
fn identical_jobs_produce_identical_output() {
    let run = || {
        let input: Vec<_> = (0..500).map(|index| (index, ())).collect();
        let job = start_job(ModTally { modulus: 7 }, input, 4).unwrap();
        let mut output = job.close();
        output.sort_unstable();
        output
    };
    assert_eq!(run(), run());
}
