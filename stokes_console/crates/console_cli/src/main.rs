use anyhow::{anyhow, bail, Context};
use base64::Engine;
use clap::Parser;
use console_core::backend::{HttpBackend, PipelineBackend};
use console_core::channel::EventChannel;
use console_core::controller::{SessionController, SessionEvent};
use console_core::editor;
use console_core::state::Phase;
use console_core::tree::{ParamTree, Path as ParamPath};
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;
use url::Url;

#[derive(Parser, Debug)]
#[command(name = "stokes_console")]
struct Args {
    /// Base URL of the pipeline API.
    #[arg(long, default_value = "http://127.0.0.1:5000/api")]
    api_url: String,

    /// WebSocket URL of the pushed event channel.
    #[arg(long, default_value = "ws://127.0.0.1:5000/events")]
    events_url: Url,

    /// Override an effect description field (KEY=VALUE, repeatable).
    #[arg(long = "describe", value_name = "KEY=VALUE")]
    describe: Vec<String>,

    /// Load parameters from a JSON file with `simulation_params` and
    /// `visualization_params` keys instead of the built-in defaults.
    #[arg(long, value_name = "PATH")]
    params_file: Option<PathBuf>,

    /// Edit one parameter before anything runs
    /// (sim.<path>=VALUE or vis.<path>=VALUE, repeatable).
    #[arg(long = "set", value_name = "PATH=VALUE")]
    set: Vec<String>,

    /// Print the editable parameter fields and exit.
    #[arg(long, default_value_t = false)]
    show_params: bool,

    /// Infer parameters from the effect description first.
    #[arg(long, default_value_t = false)]
    infer: bool,

    /// Render a preview of this many frames (1-100).
    #[arg(long, value_name = "FRAMES")]
    preview: Option<u32>,

    /// Write received preview frames as PNG files into this directory.
    #[arg(long, value_name = "DIR")]
    frames_dir: Option<PathBuf>,

    /// Start a full pipeline run and follow its events until it ends.
    #[arg(long, default_value_t = false)]
    run: bool,

    /// Send a stop request this many seconds into the run.
    #[arg(long, value_name = "SECS")]
    stop_after: Option<u64>,

    /// Skip the event channel subscription.
    #[arg(long, default_value_t = false)]
    no_events: bool,

    /// Give up following a run when no event arrives for this long.
    #[arg(long, default_value_t = 600)]
    event_timeout_secs: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();
    let args = Args::parse();

    let backend = HttpBackend::new(&args.api_url)?;
    let mut controller = match load_params(args.params_file.as_deref())? {
        Some((sim, vis)) => SessionController::with_params(backend, sim, vis),
        None => SessionController::new(backend),
    };

    for entry in &args.describe {
        let (key, value) = entry
            .split_once('=')
            .ok_or_else(|| anyhow!("--describe expects KEY=VALUE, got `{entry}`"))?;
        controller.describe(key, value);
    }

    for entry in &args.set {
        apply_edit(&mut controller, entry)?;
    }

    if args.show_params {
        print_params(&controller);
        return Ok(());
    }

    let mut inbox: Option<mpsc::Receiver<SessionEvent>> = None;
    let mut channel: Option<EventChannel> = None;
    if !args.no_events {
        let (tx, rx) = mpsc::channel(256);
        channel = Some(EventChannel::connect(args.events_url.clone(), tx));
        inbox = Some(rx);
    }

    let mut printed = 0usize;

    if args.infer {
        controller.request_inference().await?;
        flush_log(&controller, &mut printed);
    }

    if let Some(frames) = args.preview {
        controller.request_preview(frames).await?;
        flush_log(&controller, &mut printed);
        let received = controller.preview().frames().len();
        if received > 0 {
            println!("preview: {received} frame(s)");
            if let Some(dir) = &args.frames_dir {
                write_frames(dir, controller.preview().frames())?;
                println!("frames written to {}", dir.display());
            }
        }
    }

    if args.run {
        let Some(rx) = inbox.as_mut() else {
            bail!("--run needs the event channel (drop --no-events)");
        };
        controller.request_run().await?;
        flush_log(&controller, &mut printed);
        if controller.phase() == Phase::Running {
            follow_run(
                &mut controller,
                rx,
                &mut printed,
                args.stop_after,
                args.event_timeout_secs,
            )
            .await;
        }
        let run = controller.run_state();
        println!("final status: {} ({:.2}%)", run.phase.label(), run.progress);
        if let Some(url) = &run.output_url {
            println!("output: {url}");
        }
        if let Some(url) = &run.gif_url {
            println!("gif: {url}");
        }
    }

    if let Some(channel) = channel {
        channel.shutdown().await;
    }
    Ok(())
}

async fn follow_run<B: PipelineBackend>(
    controller: &mut SessionController<B>,
    inbox: &mut mpsc::Receiver<SessionEvent>,
    printed: &mut usize,
    stop_after: Option<u64>,
    event_timeout_secs: u64,
) {
    let mut stop_at = stop_after.map(|secs| tokio::time::Instant::now() + Duration::from_secs(secs));
    loop {
        tokio::select! {
            event = inbox.recv() => match event {
                Some(event) => {
                    controller.apply_event(event);
                    flush_log(controller, printed);
                    if controller.phase().is_terminal() {
                        return;
                    }
                }
                None => return,
            },
            _ = sleep_until_opt(stop_at), if stop_at.is_some() => {
                stop_at = None;
                controller.request_stop().await;
                flush_log(controller, printed);
            }
            _ = tokio::time::sleep(Duration::from_secs(event_timeout_secs)) => {
                eprintln!("no event for {event_timeout_secs}s; giving up");
                return;
            }
        }
    }
}

async fn sleep_until_opt(deadline: Option<tokio::time::Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

fn flush_log<B: PipelineBackend>(controller: &SessionController<B>, printed: &mut usize) {
    let log = controller.run_state().log();
    if *printed > log.len() {
        *printed = 0;
    }
    for line in &log[*printed..] {
        println!("{line}");
    }
    *printed = log.len();
}

fn apply_edit<B: PipelineBackend>(controller: &mut SessionController<B>, entry: &str) -> anyhow::Result<()> {
    let (target, raw) = entry
        .split_once('=')
        .ok_or_else(|| anyhow!("--set expects PATH=VALUE, got `{entry}`"))?;
    if let Some(rest) = target.strip_prefix("sim.") {
        let path: ParamPath = rest.parse()?;
        controller
            .commit_simulation_edit(&path, raw)
            .with_context(|| format!("editing `{target}`"))?;
    } else if let Some(rest) = target.strip_prefix("vis.") {
        let path: ParamPath = rest.parse()?;
        controller
            .commit_visualization_edit(&path, raw)
            .with_context(|| format!("editing `{target}`"))?;
    } else {
        bail!("--set paths start with `sim.` or `vis.` (got `{target}`)");
    }
    Ok(())
}

fn print_params<B: PipelineBackend>(controller: &SessionController<B>) {
    println!("effect description:");
    for (key, value) in controller.effect_description() {
        println!("  {key} = {value}");
    }
    println!("simulation parameters:");
    for field in editor::leaf_bindings(controller.simulation_params()) {
        println!("  sim.{} = {}", field.label, field.value);
    }
    println!("visualization parameters:");
    for field in editor::leaf_bindings(controller.visualization_params()) {
        println!("  vis.{} = {}", field.label, field.value);
    }
}

fn load_params(path: Option<&std::path::Path>) -> anyhow::Result<Option<(ParamTree, ParamTree)>> {
    let Some(path) = path else { return Ok(None) };
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read params file {}", path.display()))?;

    #[derive(serde::Deserialize)]
    struct ParamsFile {
        simulation_params: serde_json::Value,
        visualization_params: serde_json::Value,
    }

    let file: ParamsFile = serde_json::from_str(&text).context("params file is not valid JSON")?;
    let sim = ParamTree::from_value(&file.simulation_params)?;
    let vis = ParamTree::from_value(&file.visualization_params)?;
    Ok(Some((sim, vis)))
}

fn write_frames(dir: &std::path::Path, frames: &[String]) -> anyhow::Result<()> {
    std::fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    for (index, frame) in frames.iter().enumerate() {
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(frame.as_bytes())
            .with_context(|| format!("frame {index} is not valid base64"))?;
        let path = dir.join(format!("frame_{index:04}.png"));
        std::fs::write(&path, bytes).with_context(|| format!("writing {}", path.display()))?;
    }
    Ok(())
}
