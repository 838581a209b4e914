use std::{
    fs::File,
    io::BufReader,
    path::{Path, PathBuf},
};

use anyhow::Context as _;
use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "playhead", version)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Load a storyboard JSON document and report script diagnostics.
    Validate(ValidateArgs),
    /// Evaluate a storyboard at one or more playback times and print the
    /// final sprite snapshot as JSON.
    Eval(EvalArgs),
}

#[derive(Parser, Debug)]
struct ValidateArgs {
    /// Input storyboard JSON.
    #[arg(long = "in")]
    in_path: PathBuf,
}

#[derive(Parser, Debug)]
struct EvalArgs {
    /// Input storyboard JSON.
    #[arg(long = "in")]
    in_path: PathBuf,

    /// Playback time in milliseconds. May repeat; times are applied in
    /// order, so a later value smaller than an earlier one exercises a seek.
    #[arg(long, required = true)]
    time: Vec<i32>,

    /// Fire a trigger event before evaluating, as `Event@time`
    /// (e.g. `HitSoundClap@1500`). May repeat.
    #[arg(long = "fire")]
    fire: Vec<String>,

    /// Pretty-print the snapshot JSON.
    #[arg(long)]
    pretty: bool,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    match cli.cmd {
        Command::Validate(args) => cmd_validate(args),
        Command::Eval(args) => cmd_eval(args),
    }
}

fn read_storyboard_json(path: &Path) -> anyhow::Result<playhead::StoryboardDoc> {
    let f = File::open(path).with_context(|| format!("open storyboard '{}'", path.display()))?;
    let r = BufReader::new(f);
    let doc: playhead::StoryboardDoc =
        serde_json::from_reader(r).with_context(|| "parse storyboard JSON")?;
    Ok(doc)
}

fn parse_fire(spec: &str) -> anyhow::Result<(playhead::TriggerEvent, playhead::TimeMs)> {
    let (name, time) = spec
        .split_once('@')
        .with_context(|| format!("fire spec '{spec}' must be Event@time"))?;
    let event = playhead::TriggerEvent::parse(name)
        .with_context(|| format!("unknown trigger event '{name}'"))?;
    let time: i32 = time
        .parse()
        .with_context(|| format!("fire time '{time}' is not an integer"))?;
    Ok((event, playhead::TimeMs(time)))
}

fn cmd_validate(args: ValidateArgs) -> anyhow::Result<()> {
    let doc = read_storyboard_json(&args.in_path)?;
    let (sb, diagnostics) = playhead::script::build(&doc)?;

    for d in &diagnostics {
        eprintln!("warning: {}: {}", d.path, d.message);
    }
    println!(
        "ok: {} object(s), ends at {} ms, {} skipped entr(ies)",
        doc.objects.len(),
        sb.end_time().0,
        diagnostics.len()
    );
    Ok(())
}

fn cmd_eval(args: EvalArgs) -> anyhow::Result<()> {
    let doc = read_storyboard_json(&args.in_path)?;
    let (mut sb, diagnostics) = playhead::script::build(&doc)?;
    for d in &diagnostics {
        eprintln!("warning: {}: {}", d.path, d.message);
    }

    let mut pending = args
        .fire
        .iter()
        .map(|s| parse_fire(s))
        .collect::<anyhow::Result<Vec<_>>>()?;
    pending.sort_by_key(|&(_, t)| t);
    let mut pending = pending.into_iter().peekable();

    for &time in &args.time {
        let time = playhead::TimeMs(time);
        while pending.peek().is_some_and(|&(_, at)| at <= time) {
            if let Some((event, at)) = pending.next() {
                sb.fire_trigger_event(event, at);
            }
        }
        sb.update(time);
    }

    let snapshot = sb.snapshot();
    let out = std::io::stdout().lock();
    if args.pretty {
        serde_json::to_writer_pretty(out, &snapshot)?;
    } else {
        serde_json::to_writer(out, &snapshot)?;
    }
    println!();
    Ok(())
}
