//! traj-play — replay a recorded trajectory against the built-in simulator.
//!
//! Parses a `.traj` recording and drives the full playback pipeline
//! (parser, session guard, playback controller) against a simulated arm,
//! so recordings can be validated end to end without hardware. Point the
//! same pipeline at real hardware by implementing `ArmDriver` over your
//! arm's SDK.
//!
//! Usage:
//!   traj-play <traj-file> [options]
//!
//! Options:
//!   --slow               Slow motion profile, angles in radians (default: fast/degrees)
//!   --gripper            Enable gripper choreography (close at 1/2, open at 3/4)
//!   --close-at <frac>    Gripper close fraction (default: 0.5)
//!   --open-at <frac>     Gripper open fraction (default: 0.75)
//!   --fault-at <n>       Simulate a fault on the n-th joint command (testing)

use anyhow::Result;
use armplay::sim::SimArm;
use armplay::{playback, GripperPlan, PlaybackConfig, Session, SessionConfig, Trajectory};
use std::sync::Arc;

struct Args {
    traj_path: String,
    slow: bool,
    gripper: bool,
    close_at: f64,
    open_at: f64,
    fault_at: Option<usize>,
}

fn usage() {
    println!("Usage: traj-play <traj-file> [options]");
    println!();
    println!("Options:");
    println!("  --slow               Slow motion profile, angles in radians");
    println!("  --gripper            Enable gripper choreography (close at 1/2, open at 3/4)");
    println!("  --close-at <frac>    Gripper close fraction (default: 0.5)");
    println!("  --open-at <frac>     Gripper open fraction (default: 0.75)");
    println!("  --fault-at <n>       Simulate a fault on the n-th joint command");
}

fn parse_args() -> Result<Option<Args>> {
    let argv: Vec<String> = std::env::args().collect();
    if argv.len() < 2 {
        return Ok(None);
    }

    let mut args = Args {
        traj_path: String::new(),
        slow: false,
        gripper: false,
        close_at: 0.5,
        open_at: 0.75,
        fault_at: None,
    };

    let mut i = 1;
    while i < argv.len() {
        match argv[i].as_str() {
            "--slow" => args.slow = true,
            "--gripper" => args.gripper = true,
            "--close-at" => {
                i += 1;
                args.close_at = next_value(&argv, i, "--close-at")?.parse()?;
            }
            "--open-at" => {
                i += 1;
                args.open_at = next_value(&argv, i, "--open-at")?.parse()?;
            }
            "--fault-at" => {
                i += 1;
                args.fault_at = Some(next_value(&argv, i, "--fault-at")?.parse()?);
            }
            "--help" | "-h" => return Ok(None),
            other if args.traj_path.is_empty() && !other.starts_with('-') => {
                args.traj_path = other.to_string();
            }
            other => anyhow::bail!("unknown argument: {other}"),
        }
        i += 1;
    }
    if args.traj_path.is_empty() {
        return Ok(None);
    }
    Ok(Some(args))
}

fn next_value<'a>(argv: &'a [String], i: usize, flag: &str) -> Result<&'a str> {
    argv.get(i)
        .map(|s| s.as_str())
        .ok_or_else(|| anyhow::anyhow!("{flag} requires a value"))
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("armplay=info".parse()?)
                .add_directive("warn".parse()?),
        )
        .init();

    let Some(args) = parse_args()? else {
        usage();
        return Ok(());
    };

    println!("Loading {}...", args.traj_path);
    let (trajectory, warnings) = Trajectory::parse(&args.traj_path)?;
    println!(
        "  {} waypoints at {} Hz ({:.1}s), {} lines skipped",
        trajectory.len(),
        trajectory.sample_rate_hz,
        trajectory.duration().as_secs_f64(),
        warnings.len()
    );

    let mut config = if args.slow {
        PlaybackConfig::slow_radians()
    } else {
        PlaybackConfig::fast()
    };
    if args.gripper {
        config = config.with_gripper(GripperPlan {
            close_at: args.close_at,
            open_at: args.open_at,
            ..GripperPlan::default()
        });
    }

    let arm = Arc::new(SimArm::new());
    if let Some(n) = args.fault_at {
        arm.fail_joint_command_at(n, 1);
    }

    let session = Session::open(arm.clone(), SessionConfig::default())?;
    let outcome = playback::play(&session, &trajectory, &config);
    session.close();

    if outcome.completed {
        println!("Playback complete ({} waypoints sent).", outcome.sent);
    } else {
        println!(
            "Playback ended early: {}/{} waypoints sent.",
            outcome.sent, outcome.total
        );
    }
    Ok(())
}
