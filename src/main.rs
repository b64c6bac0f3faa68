use anyhow::Context;
use chrono::Local;
use clap::Parser;
use log::{info, warn};
use room_timeline::types::{Direction, ReceiptEntry, TimelineEvent};
use room_timeline::{MemorySession, RoomTimeline, TimelineConfig};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;

// Replays a recorded room script through the timeline engine and prints what a
// renderer would draw.
//
// Usage:
//   cargo run --bin timeline-replay -- room.json
//   cargo run --bin timeline-replay -- room.json --config timeline.json --raw

#[derive(Parser, Debug)]
#[command(name = "timeline-replay", version, about = "Replay a room timeline script")]
struct Args {
    /// JSON script with `live`, `history`, `receipts` and `paginate_until`
    script: PathBuf,

    /// JSON file overriding timeline settings
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Also print the unfiltered snapshot
    #[arg(long)]
    raw: bool,
}

#[derive(Deserialize, Debug, Default)]
#[serde(default)]
struct Script {
    room_id: String,
    live: Vec<TimelineEvent>,
    /// Backward pages, each newest first, in the order they are served.
    history: Vec<ScriptPage>,
    receipts: HashMap<String, Vec<ReceiptEntry>>,
    paginate_until: Option<String>,
}

#[derive(Deserialize, Debug)]
struct ScriptPage {
    events: Vec<TimelineEvent>,
    #[serde(default)]
    has_more: bool,
}

fn main() -> Result<(), anyhow::Error> {
    let args = Args::parse();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format(|buf, record| {
            use std::io::Write;
            writeln!(
                buf,
                "{} [{:<5}] [{}] - {}",
                Local::now().format("%H:%M:%S"),
                record.level(),
                record.target(),
                record.args()
            )
        })
        .init();

    let config = match &args.config {
        Some(path) => TimelineConfig::from_json_file(path)?,
        None => TimelineConfig::default(),
    };
    let raw = std::fs::read_to_string(&args.script)
        .with_context(|| format!("failed to read script {}", args.script.display()))?;
    let script: Script = serde_json::from_str(&raw).context("invalid script")?;

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to build tokio runtime")?;

    rt.block_on(replay(script, config, args.raw))
}

async fn replay(script: Script, config: TimelineConfig, print_raw: bool) -> Result<(), anyhow::Error> {
    let session = Arc::new(MemorySession::new());
    for page in script.history {
        session.push_page(page.events, page.has_more).await;
    }
    for (event_id, entries) in script.receipts {
        session.set_receipts(&event_id, entries).await;
    }

    let timeline = Arc::new(RoomTimeline::new(
        script.room_id,
        session.clone(),
        config,
    ));

    let (tx, rx) = mpsc::channel(64);
    let runner = tokio::spawn(Arc::clone(&timeline).run(rx));
    for event in script.live {
        tx.send((event, Direction::Forward))
            .await
            .context("timeline stopped early")?;
    }
    drop(tx);
    runner.await.context("timeline task failed")?;

    if let Some(target) = script.paginate_until {
        match timeline.paginate_until(&target).await {
            Ok(()) => info!("Loaded history up to {target}"),
            Err(e) => warn!("Could not load {target}: {e}"),
        }
    }

    if print_raw {
        println!("== snapshot ({} events)", timeline.snapshot().await.len());
        for event in timeline.snapshot().await {
            println!("{} {} {}", event.event_type, display_id(&event), event.sender);
        }
        println!();
    }

    let visible = timeline.renderable_snapshot().await;
    println!("== {} ({} visible events)", timeline.room_id(), visible.len());
    for event in &visible {
        println!("{}", render_line(&timeline, event).await);
    }

    timeline.close().await;
    Ok(())
}

fn display_id(event: &TimelineEvent) -> &str {
    if event.has_id() {
        &event.id
    } else {
        event.transaction_id.as_deref().unwrap_or("-")
    }
}

async fn render_line(timeline: &RoomTimeline, event: &TimelineEvent) -> String {
    let time = event
        .origin_time()
        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| "--".to_string());

    let edges = timeline.grouping_edges(&event.id).await;
    let gutter = match (edges.top, edges.bottom) {
        (false, false) => "─",
        (false, true) => "┌",
        (true, true) => "│",
        (true, false) => "└",
    };

    let mut line = format!(
        "{gutter} {time} {:<12} {:<12} {}",
        event.sender,
        event.event_type,
        event.body().unwrap_or("")
    );
    if event.is_edited() {
        line.push_str(" (edited)");
    }
    if event.event_type.is_call_lifecycle() {
        match timeline.call_duration_ms(&event.id).await {
            Some(ms) => line.push_str(&format!(" [call, {}s]", ms / 1000)),
            None => line.push_str(" [call]"),
        }
    }

    let reactions = timeline.grouped_reactions(&event.id).await;
    if !reactions.is_empty() {
        let summary: Vec<String> = reactions
            .iter()
            .map(|g| format!("{} {}", g.key, g.count))
            .collect();
        line.push_str(&format!(" [{}]", summary.join(", ")));
    }

    let readers = timeline.receipts_for(&event.id).await;
    if !readers.is_empty() {
        let users: Vec<&str> = readers.iter().map(|r| r.user_id.as_str()).collect();
        line.push_str(&format!(" ✓ {}", users.join(", ")));
    }
    line
}
