use anyhow::{Context, Result};
use brokk::{start_job, Group, MapReduce};
use clap::Parser;
use regex::Regex;
use std::fs;

#[derive(Parser, Debug)]
struct Args {
    /// Input text file
    #[arg(long)]
    input: String,
    /// Number of worker threads
    #[arg(long, default_value_t = brokk::config::default_workers())]
    workers: usize,
}

struct Wordcount {
    word_re: Regex,
}

impl MapReduce for Wordcount {
    type InputKey = ();
    type InputValue = String;
    type Key = String;
    type Value = u64;
    type OutputKey = String;
    type OutputValue = u64;

    fn do_map<F>(&self, _key: &(), line: &String, emit: &mut F)
    where
        F: FnMut(String, u64),
    {
        for hit in self.word_re.find_iter(line) {
            emit(hit.as_str().to_lowercase(), 1);
        }
    }

    fn do_reduce<F>(&self, group: Group<String, u64>, emit: &mut F)
    where
        F: FnMut(String, u64),
    {
        let sum = group.iter().map(|(_, count)| count).sum();
        let (word, _) = group.into_iter().next().expect("groups are never empty");
        emit(word, sum);
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();
    let args = Args::parse();

    let text = fs::read_to_string(&args.input)
        .with_context(|| format!("read input file {}", args.input))?;
    let input = text.lines().map(|line| ((), line.to_string())).collect();

    let client = Wordcount {
        word_re: Regex::new(r"[A-Za-z0-9_']+")?,
    };
    let job = start_job(client, input, args.workers)?;

    let mut output = job.close();
    output.sort_unstable_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    for (word, count) in output {
        println!("{word}\t{count}");
    }
    Ok(())
}
