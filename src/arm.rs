//! Actuator driver seam for position-controlled robot arms.
//!
//! This module defines the `ArmDriver` trait that the playback core talks to.
//! Concrete implementations wrap a vendor arm SDK (or the built-in simulator
//! in [`crate::sim`]); the rest of the crate never touches hardware directly.
//!
//! Commands follow the result-code convention of the underlying controllers:
//! every command returns an `i32` code where `0` means accepted and anything
//! else is a controller error. Transport-level failures surface the same way,
//! through the driver's own error code. Fault and state changes arrive
//! asynchronously on driver-owned threads via subscribed callbacks.
//!
//! # Example
//!
//! ```no_run
//! use armplay::arm::{ArmDriver, JointCommand, JOINT_COUNT};
//!
//! fn send_home(arm: &dyn ArmDriver) -> bool {
//!     let cmd = JointCommand {
//!         angles: [0.0; JOINT_COUNT],
//!         speed: 100.0,
//!         acceleration: 300.0,
//!         wait: true,
//!         radians: false,
//!     };
//!     arm.set_joint_angles(&cmd) == 0
//! }
//! ```

use std::sync::Arc;

/// Number of joints in a command vector.
pub const JOINT_COUNT: usize = 7;

/// Fully-open gripper position in controller units.
pub const GRIPPER_OPEN_POSITION: f64 = 850.0;

/// Control modes accepted by [`ArmDriver::set_mode`].
pub mod mode {
    /// Position control mode.
    pub const POSITION: i32 = 0;
}

/// Controller state values reported by [`ArmDriver::state`].
pub mod arm_state {
    /// Ready to accept motion commands.
    pub const READY: i32 = 0;
    /// Terminal stopped state; the controller refuses further motion.
    pub const STOPPED: i32 = 4;
    /// Transient state while the controller settles after a mode or
    /// motion change. Expected to clear on its own.
    pub const PAUSING: i32 = 5;
}

/// A joint-angle move command.
#[derive(Clone, Debug)]
pub struct JointCommand {
    /// Target angle per joint, in degrees or radians per `radians`.
    pub angles: [f64; JOINT_COUNT],
    /// Joint speed limit.
    pub speed: f64,
    /// Joint acceleration limit.
    pub acceleration: f64,
    /// Block until the move physically completes.
    pub wait: bool,
    /// Interpret `angles` as radians instead of degrees.
    pub radians: bool,
}

/// A gripper move command.
#[derive(Clone, Copy, Debug)]
pub struct GripperCommand {
    /// Target opening in controller units (0 = closed).
    pub position: f64,
    /// Gripper speed.
    pub speed: f64,
    /// Block until the gripper reaches the target.
    pub wait: bool,
    /// Enable the gripper before moving if it is not already enabled.
    pub auto_enable: bool,
}

/// Callback invoked on a driver-owned thread when a fault code or state
/// value changes. The argument is the new code/state.
pub type NotifyCallback = Arc<dyn Fn(i32) + Send + Sync>;

/// Opaque handle identifying one notification subscription.
pub type SubscriptionId = u64;

/// Capability set the playback core requires from an arm.
///
/// Implementations must be safe to call from the control thread while
/// notification callbacks fire on driver-owned threads. Unsubscribing an
/// already-removed subscription is a no-op, so callbacks may unsubscribe
/// themselves.
pub trait ArmDriver: Send + Sync {
    /// Whether the connection to the controller is up.
    fn connected(&self) -> bool;

    /// Current controller state (see [`arm_state`]).
    fn state(&self) -> i32;

    /// Current fault code (0 = no fault).
    fn fault_code(&self) -> i32;

    /// Clear pending warnings.
    fn clean_warn(&self) -> i32;

    /// Clear pending errors.
    fn clean_error(&self) -> i32;

    /// Enable or disable motion.
    fn motion_enable(&self, enable: bool) -> i32;

    /// Select a control mode (see [`mode`]).
    fn set_mode(&self, mode: i32) -> i32;

    /// Request an operational state (see [`arm_state`]).
    fn set_state(&self, state: i32) -> i32;

    /// Command all joints to the given angles. Returns once the command is
    /// accepted when `cmd.wait` is false.
    fn set_joint_angles(&self, cmd: &JointCommand) -> i32;

    /// Command the gripper to the given position.
    fn set_gripper_position(&self, cmd: &GripperCommand) -> i32;

    /// Subscribe to fault-code changes.
    fn subscribe_fault_changes(&self, cb: NotifyCallback) -> SubscriptionId;

    /// Remove a fault-change subscription. No-op if already removed.
    fn unsubscribe_fault_changes(&self, id: SubscriptionId);

    /// Subscribe to controller state changes.
    fn subscribe_state_changes(&self, cb: NotifyCallback) -> SubscriptionId;

    /// Remove a state-change subscription. No-op if already removed.
    fn unsubscribe_state_changes(&self, id: SubscriptionId);

    /// Drop the connection. Safe to call more than once.
    fn disconnect(&self);
}
