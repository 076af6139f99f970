//! Trajectory recording playback for position-controlled robot arms.
//!
//! Replays a recorded multi-joint trajectory on an arm: parse the `.traj`
//! recording (sampling-frequency header plus one comma-separated joint
//! vector per line), stream it through an [`ArmDriver`] at the recorded
//! sample rate, and optionally choreograph the gripper at fixed progress
//! fractions. A [`Session`] guards the whole run: it tracks asynchronous
//! fault and state notifications from the controller and stops playback as
//! soon as the arm goes unhealthy.
//!
//! # Features
//!
//! - Fault-tolerant recording parser: corrupt lines are skipped with a
//!   warning, not fatal
//! - Driver seam trait so the same playback loop runs against any arm SDK
//!   or the built-in simulator
//! - One-way session liveness with a bounded settle poll for transient
//!   controller states
//! - Fast (degrees) and slow (radians) motion profiles as configuration
//!
//! # Example
//!
//! ```no_run
//! use armplay::{playback, PlaybackConfig, Session, SessionConfig, Trajectory};
//! use armplay::sim::SimArm;
//! use std::sync::Arc;
//!
//! # fn main() -> anyhow::Result<()> {
//! let (trajectory, warnings) = Trajectory::parse("open_window.traj")?;
//! println!("{} waypoints, {} bad lines", trajectory.len(), warnings.len());
//!
//! let arm = Arc::new(SimArm::new());
//! let session = Session::open(arm, SessionConfig::default())?;
//! let outcome = playback::play(&session, &trajectory, &PlaybackConfig::fast());
//! session.close();
//! println!("sent {}/{} waypoints", outcome.sent, outcome.total);
//! # Ok(())
//! # }
//! ```

pub mod arm;
pub mod playback;
pub mod session;
pub mod sim;
pub mod trajectory;

pub use arm::{ArmDriver, GripperCommand, JointCommand, JOINT_COUNT};
pub use playback::{GripperPlan, PlaybackConfig, PlaybackOutcome};
pub use session::{Session, SessionConfig};
pub use trajectory::{ParseWarning, Trajectory, Waypoint};
