//! Real-time trajectory playback.
//!
//! Streams a parsed [`Trajectory`] to a [`Session`] at the recording's
//! sample rate: one non-blocking joint command per waypoint, a fixed sleep
//! between steps, and an optional gripper choreography keyed to playback
//! progress. Pacing is open-loop; there is no drift compensation, so
//! cumulative timing error equals the sum of command-issue latencies.
//!
//! Playback stops as soon as the session guard reports the arm dead. That
//! is a normal outcome, not an error: the remaining waypoints are dropped
//! and the caller closes the session.

use std::thread;
use std::time::Instant;

use crate::arm::{GripperCommand, JointCommand, GRIPPER_OPEN_POSITION};
use crate::session::Session;
use crate::trajectory::Trajectory;

/// Gripper choreography keyed to playback progress.
///
/// The trigger points are fractions of the waypoint count, not fixed
/// indices, so the same plan works for recordings of any length. The
/// defaults (close at the midpoint, release at three quarters) match the
/// recorded window-opening motion this crate grew out of.
#[derive(Clone, Debug)]
pub struct GripperPlan {
    /// Progress fraction at which the close command is issued.
    pub close_at: f64,
    /// Progress fraction at which the open command is issued.
    pub open_at: f64,
    /// Gripper target for the close command.
    pub close_position: f64,
    /// Gripper target for the open command.
    pub open_position: f64,
    /// Gripper speed for both commands.
    pub speed: f64,
}

impl Default for GripperPlan {
    fn default() -> Self {
        Self {
            close_at: 0.5,
            open_at: 0.75,
            close_position: 0.0,
            open_position: GRIPPER_OPEN_POSITION,
            speed: 5000.0,
        }
    }
}

/// Motion profile for a playback run.
///
/// The angle unit and the speed/acceleration limits are configuration, not
/// behavior: the same loop drives both profiles.
#[derive(Clone, Debug)]
pub struct PlaybackConfig {
    /// Joint speed limit.
    pub speed: f64,
    /// Joint acceleration limit.
    pub acceleration: f64,
    /// Waypoint angles are radians instead of degrees.
    pub radians: bool,
    /// Optional gripper choreography.
    pub gripper: Option<GripperPlan>,
}

impl PlaybackConfig {
    /// Fast profile: large limits, angles in degrees.
    pub fn fast() -> Self {
        Self {
            speed: 100.0,
            acceleration: 300.0,
            radians: false,
            gripper: None,
        }
    }

    /// Slow profile: small limits, angles in radians.
    pub fn slow_radians() -> Self {
        Self {
            speed: 5.0,
            acceleration: 10.0,
            radians: true,
            gripper: None,
        }
    }

    /// Attach a gripper plan to this profile.
    pub fn with_gripper(mut self, plan: GripperPlan) -> Self {
        self.gripper = Some(plan);
        self
    }
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self::fast()
    }
}

/// What a playback run did.
#[derive(Clone, Copy, Debug)]
pub struct PlaybackOutcome {
    /// Waypoints in the trajectory.
    pub total: usize,
    /// Joint commands accepted before the run ended.
    pub sent: usize,
    /// True if every waypoint was sent.
    pub completed: bool,
}

/// Play a trajectory through a session.
///
/// Issues one non-blocking joint command per waypoint at the recording's
/// sample rate, interleaving the gripper plan if one is configured. The
/// first rejected command (or fault/stop notification) ends the run early
/// with `completed == false`; nothing further is sent. An empty trajectory
/// is a no-op. The caller is expected to close the session afterwards
/// whatever the outcome.
pub fn play(session: &Session, trajectory: &Trajectory, config: &PlaybackConfig) -> PlaybackOutcome {
    let total = trajectory.len();
    if total == 0 {
        tracing::info!("empty trajectory, nothing to play");
        return PlaybackOutcome {
            total: 0,
            sent: 0,
            completed: true,
        };
    }

    let time_step = trajectory.time_step();
    let triggers = config
        .gripper
        .as_ref()
        .map(|plan| (fraction_index(plan.close_at, total), fraction_index(plan.open_at, total)));

    tracing::info!(
        total,
        sample_rate_hz = trajectory.sample_rate_hz,
        duration_s = trajectory.duration().as_secs_f64(),
        "starting playback"
    );
    let started = Instant::now();

    let mut sent = 0usize;
    'steps: for (index, waypoint) in trajectory.waypoints.iter().enumerate() {
        if let (Some(plan), Some((close_index, open_index))) = (config.gripper.as_ref(), triggers) {
            if index == close_index {
                tracing::debug!(index, "closing gripper");
                let cmd = GripperCommand {
                    position: plan.close_position,
                    speed: plan.speed,
                    wait: false,
                    auto_enable: true,
                };
                if !session.move_gripper(&cmd) {
                    break 'steps;
                }
            }
            if index == open_index {
                tracing::debug!(index, "opening gripper");
                let cmd = GripperCommand {
                    position: plan.open_position,
                    speed: plan.speed,
                    wait: false,
                    auto_enable: true,
                };
                if !session.move_gripper(&cmd) {
                    break 'steps;
                }
            }
        }

        let cmd = JointCommand {
            angles: *waypoint,
            speed: config.speed,
            acceleration: config.acceleration,
            wait: false,
            radians: config.radians,
        };
        if !session.move_joints(&cmd) {
            break 'steps;
        }
        sent += 1;

        thread::sleep(time_step);
    }

    let completed = sent == total;
    if completed {
        tracing::info!(
            sent,
            elapsed_s = started.elapsed().as_secs_f64(),
            "playback complete"
        );
    } else {
        tracing::warn!(sent, total, "playback ended early, dropping remaining waypoints");
    }
    PlaybackOutcome {
        total,
        sent,
        completed,
    }
}

/// Index at which a progress fraction fires, for an `n`-waypoint run.
fn fraction_index(fraction: f64, total: usize) -> usize {
    (fraction * total as f64).floor() as usize
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arm::{arm_state, ArmDriver};
    use crate::session::{Session, SessionConfig};
    use crate::sim::{SimArm, SimOp};
    use crate::trajectory::Trajectory;
    use std::io::Cursor;
    use std::sync::Arc;

    fn trajectory(n: usize) -> Trajectory {
        // High sample rate keeps the per-step sleeps negligible in tests.
        let mut text = String::from("# frequency=2000.0\n");
        for i in 0..n {
            text.push_str(&format!("{i},0,0,0,0,0,0\n"));
        }
        let (traj, warnings) = Trajectory::parse_reader(Cursor::new(text)).unwrap();
        assert!(warnings.is_empty());
        traj
    }

    fn open_sim() -> (Arc<SimArm>, Session) {
        let arm = Arc::new(SimArm::new());
        let config = SessionConfig {
            settle_polls: 1,
            settle_interval: std::time::Duration::from_millis(1),
        };
        let session = Session::open(arm.clone() as Arc<dyn ArmDriver>, config).unwrap();
        (arm, session)
    }

    #[test]
    fn test_clean_run_sends_every_waypoint() {
        let (arm, session) = open_sim();
        let outcome = play(&session, &trajectory(5), &PlaybackConfig::fast());
        assert!(outcome.completed);
        assert_eq!(outcome.sent, 5);
        assert_eq!(arm.joint_commands().len(), 5);
        // Waypoints arrive in recording order.
        let first: Vec<f64> = arm.joint_commands().iter().map(|c| c.angles[0]).collect();
        assert_eq!(first, vec![0.0, 1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_commands_are_non_blocking() {
        let (arm, session) = open_sim();
        play(&session, &trajectory(3), &PlaybackConfig::fast());
        assert!(arm.joint_commands().iter().all(|c| !c.wait));
    }

    #[test]
    fn test_profile_controls_unit_and_limits() {
        let (arm, session) = open_sim();
        play(&session, &trajectory(1), &PlaybackConfig::slow_radians());
        let cmd = &arm.joint_commands()[0];
        assert!(cmd.radians);
        assert_eq!(cmd.speed, 5.0);
        assert_eq!(cmd.acceleration, 10.0);
    }

    #[test]
    fn test_failed_command_stops_the_run() {
        let (arm, session) = open_sim();
        arm.fail_joint_command_at(3, 9);
        let outcome = play(&session, &trajectory(8), &PlaybackConfig::fast());
        assert!(!outcome.completed);
        assert_eq!(outcome.sent, 3);
        // The failing command was issued; nothing after it was.
        assert_eq!(arm.joint_commands().len(), 4);
        session.close();
        assert_eq!(arm.disconnect_count(), 1);
    }

    #[test]
    fn test_fault_notification_stops_the_run() {
        let (arm, session) = open_sim();
        arm.inject_fault(21);
        let outcome = play(&session, &trajectory(4), &PlaybackConfig::fast());
        assert!(!outcome.completed);
        assert_eq!(outcome.sent, 0);
    }

    #[test]
    fn test_gripper_choreography_indices() {
        let (arm, session) = open_sim();
        let config = PlaybackConfig::fast().with_gripper(GripperPlan::default());
        let outcome = play(&session, &trajectory(8), &config);
        assert!(outcome.completed);

        // n = 8: close fires right before waypoint 4, open right before 6.
        let ops = arm.ops();
        let positions: Vec<usize> = ops
            .iter()
            .enumerate()
            .filter_map(|(i, op)| matches!(op, SimOp::Gripper(_)).then_some(i))
            .collect();
        assert_eq!(positions, vec![4, 7]);

        let grippers: Vec<&GripperCommand> = ops
            .iter()
            .filter_map(|op| match op {
                SimOp::Gripper(cmd) => Some(cmd),
                _ => None,
            })
            .collect();
        assert_eq!(grippers.len(), 2);
        assert_eq!(grippers[0].position, 0.0);
        assert_eq!(grippers[1].position, GRIPPER_OPEN_POSITION);
        assert!(grippers.iter().all(|c| !c.wait && c.auto_enable));
    }

    #[test]
    fn test_gripper_disabled_by_default() {
        let (arm, session) = open_sim();
        play(&session, &trajectory(8), &PlaybackConfig::fast());
        assert!(arm.gripper_commands().is_empty());
    }

    #[test]
    fn test_empty_trajectory_is_a_no_op() {
        let (arm, session) = open_sim();
        let (traj, _) = Trajectory::parse_reader(Cursor::new("# frequency=100.0\n")).unwrap();
        let outcome = play(&session, &traj, &PlaybackConfig::fast());
        assert!(outcome.completed);
        assert_eq!(outcome.sent, 0);
        assert!(arm.joint_commands().is_empty());
    }

    #[test]
    fn test_stop_notification_mid_run() {
        let (arm, session) = open_sim();
        arm.stop_after_joint_commands(2, arm_state::STOPPED);
        let outcome = play(&session, &trajectory(6), &PlaybackConfig::fast());
        assert!(!outcome.completed);
        assert!(arm.joint_commands().len() < 6);
    }
}
