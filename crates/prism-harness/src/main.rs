//! Prism simulation binary.
//!
//! Plays a seeded random call against the simulated SDK, checks after every
//! tick that the projected snapshot matches the simulated graph, and reports
//! how often the bound selectors let a view skip rendering.
//!
//! # Usage
//!
//! ```bash
//! # Same seed, same run
//! prism-sim --seed 7 --ticks 2000
//!
//! # Bigger roster, per-operation logging
//! RUST_LOG=debug prism-sim --participants 16
//! ```

use arbitrary::{Arbitrary, Unstructured};
use clap::Parser;
use prism_core::{
    ViewBinding,
    sdk::Call,
    selectors::{CallProps, ParticipantListSelector, VideoGallerySelector, call_status_selector},
    subscribe_binding,
};
use prism_harness::{CallWorld, Operation, OperationResult, WorldConfig};
use prism_memo::{CacheStats, Selector};
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Prism call simulation
#[derive(Parser, Debug)]
#[command(name = "prism-sim")]
#[command(about = "Deterministic call simulation against the prism state projection")]
#[command(version)]
struct Args {
    /// RNG seed
    #[arg(short, long, default_value = "0")]
    seed: u64,

    /// Operations to play
    #[arg(short, long, default_value = "1000")]
    ticks: u32,

    /// Remote participants on the roster
    #[arg(short, long, default_value = "8")]
    participants: u8,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

/// Outcome counters of one run.
#[derive(Debug, Default)]
struct Tally {
    applied: u32,
    no_effect: u32,
    rejected: u32,
    skipped: u32,
}

/// The simulated call stays up for the whole run so the bindings keep
/// pointing at it.
fn touches_call_lifecycle(op: &Operation) -> bool {
    matches!(op, Operation::StartCall | Operation::ReceiveCall | Operation::EndCall { .. })
}

fn log_stats(name: &str, renders: u64, stats: Option<CacheStats>) {
    let stats = stats.unwrap_or_default();
    tracing::info!(
        selector = name,
        renders,
        hits = stats.hits,
        misses = stats.misses,
        hit_rate = stats.hit_rate(),
        "selector stats"
    );
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    tracing::info!(
        seed = args.seed,
        ticks = args.ticks,
        participants = args.participants,
        "prism-sim starting"
    );

    let config = WorldConfig {
        seed: args.seed,
        roster: args.participants.max(1),
        max_calls: 1,
        ..WorldConfig::default()
    };
    let mut world = CallWorld::new(config)?;
    let _ = world.apply(&Operation::StartCall);
    let call_id = world
        .agent()
        .sim_calls()
        .first()
        .map(|call| call.id())
        .ok_or("simulated call did not start")?;
    for participant in 0..config.roster {
        let _ = world.apply(&Operation::Join { call: 0, participant });
    }

    let props = CallProps { call_id: call_id.clone() };
    let store = world.client().store();
    let (status_id, status) =
        subscribe_binding(store, ViewBinding::new(call_status_selector(), props.clone()), |_| {});
    let list_binding = ViewBinding::new(ParticipantListSelector::new(), props.clone());
    let (list_id, list) = subscribe_binding(store, list_binding, |_| {});
    let (gallery_id, gallery) =
        subscribe_binding(store, ViewBinding::new(VideoGallerySelector::new(), props), |_| {});

    let mut rng = ChaCha8Rng::seed_from_u64(args.seed);
    let mut bytes = [0u8; 64];
    let mut tally = Tally::default();

    for tick in 0..args.ticks {
        rng.fill_bytes(&mut bytes);
        let op = Operation::arbitrary(&mut Unstructured::new(&bytes))?;
        if touches_call_lifecycle(&op) {
            tally.skipped += 1;
            continue;
        }

        let result = world.apply(&op);
        tracing::debug!(tick, ?op, ?result, "applied");
        match result {
            OperationResult::Applied => tally.applied += 1,
            OperationResult::NoEffect => tally.no_effect += 1,
            OperationResult::Rejected => tally.rejected += 1,
        }

        if world.projected_view() != world.sdk_view() {
            tracing::error!(tick, ?op, "projection diverged from the simulated call");
            return Err(format!("projection diverged at tick {tick}").into());
        }
    }

    let store = world.client().store();
    let version = store.version();
    tracing::info!(
        %call_id,
        version,
        applied = tally.applied,
        no_effect = tally.no_effect,
        rejected = tally.rejected,
        skipped = tally.skipped,
        "run finished"
    );
    {
        let status = status.borrow();
        log_stats("call_status", status.renders(), status.selector().stats());
        let list = list.borrow();
        log_stats("participant_list", list.renders(), list.selector().stats());
        log_stats("participant_rows", list.renders(), Some(list.selector().row_stats()));
        let gallery = gallery.borrow();
        log_stats("video_gallery", gallery.renders(), gallery.selector().stats());
        log_stats("gallery_tiles", gallery.renders(), Some(gallery.selector().tile_stats()));
    }

    for id in [status_id, list_id, gallery_id] {
        let _ = store.off_state_change(id);
    }
    tracing::info!(
        attached = world.attached_listeners(),
        tracked = world.client().tracked_count(),
        "listener parity"
    );
    world.client().dispose();

    Ok(())
}
