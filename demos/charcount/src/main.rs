use anyhow::Result;
use brokk::{start_job, Group, JobState, MapReduce, Stage, MAX_PERCENTAGE};
use clap::Parser;
use std::thread;
use std::time::Duration;

#[derive(Parser, Debug)]
struct Args {
    /// Number of worker threads
    #[arg(long, default_value_t = brokk::config::default_workers())]
    workers: usize,
}

struct CharCounter;

impl MapReduce for CharCounter {
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
                // Slow the job down so the progress printout below has
                // something to show.
                thread::sleep(Duration::from_millis(25));
                emit(byte as u8, count);
            }
        }
    }

    fn do_reduce<F>(&self, group: Group<u8, u32>, emit: &mut F)
    where
        F: FnMut(u8, u32),
    {
        let byte = group[0].0;
        let total = group.iter().map(|(_, count)| count).sum();
        thread::sleep(Duration::from_millis(25));
        emit(byte, total);
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();
    let args = Args::parse();

    let input = [
        "This string is full of characters",
        "Multithreading is awesome",
        "race conditions are bad",
    ]
    .into_iter()
    .map(|line| ((), line.to_string()))
    .collect();

    let job = start_job(CharCounter, input, args.workers)?;

    let mut last: Option<JobState> = None;
    loop {
        let state = job.state();
        if last != Some(state) {
            println!("stage {:?}, {:.1}%", state.stage, state.percentage);
        }
        last = Some(state);
        if state.stage == Stage::Reduce && state.percentage >= MAX_PERCENTAGE {
            break;
        }
        thread::sleep(Duration::from_millis(100));
    }
    println!("Done!");

    let mut output = job.close();
    output.sort_unstable_by_key(|(byte, _)| *byte);
    for (byte, count) in output {
        println!(
            "The character {} appeared {} time{}",
            byte as char,
            count,
            if count > 1 { "s" } else { "" }
        );
    }
    Ok(())
}
