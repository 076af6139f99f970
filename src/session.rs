//! Arm session guard.
//!
//! A [`Session`] wraps an [`ArmDriver`] connection for the lifetime of one
//! playback attempt: it puts the controller into a known-good state on open,
//! tracks asynchronous fault/state notifications, and gates every command
//! through [`Session::check`]. Once a fault or terminal state is observed
//! the session is dead for good; there is no reset short of opening a new
//! session.
//!
//! Notification callbacks run on driver-owned threads while the playback
//! loop reads liveness from the control thread, so the shared health fields
//! are atomics rather than plain flags.

use anyhow::{bail, Result};
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use crate::arm::{arm_state, mode, ArmDriver, GripperCommand, JointCommand, SubscriptionId};

/// Session tuning knobs.
#[derive(Clone, Debug)]
pub struct SessionConfig {
    /// Maximum liveness polls while the controller reports a transient
    /// pausing state.
    pub settle_polls: u32,
    /// Delay between settle polls.
    pub settle_interval: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            settle_polls: 5,
            settle_interval: Duration::from_millis(100),
        }
    }
}

/// Health fields shared with the driver's notification threads.
struct Shared {
    alive: AtomicBool,
    last_fault: AtomicI32,
    last_state: AtomicI32,
}

type SubSlot = Arc<Mutex<Option<SubscriptionId>>>;

/// A live connection to the arm, gated by fault/state tracking.
///
/// Dropping the session (or calling [`Session::close`]) unsubscribes from
/// notifications and disconnects the driver, exactly once, regardless of
/// how playback ended.
pub struct Session {
    driver: Arc<dyn ArmDriver>,
    shared: Arc<Shared>,
    config: SessionConfig,
    fault_sub: SubSlot,
    state_sub: SubSlot,
    closed: AtomicBool,
}

impl Session {
    /// Open a session on a connected driver.
    ///
    /// Clears pending warnings and errors, enables motion, selects position
    /// control, requests the ready state, and subscribes to fault and state
    /// notifications. Any non-zero setup code aborts the open.
    pub fn open(driver: Arc<dyn ArmDriver>, config: SessionConfig) -> Result<Self> {
        setup_step("clean_warn", driver.clean_warn())?;
        setup_step("clean_error", driver.clean_error())?;
        setup_step("motion_enable", driver.motion_enable(true))?;
        setup_step("set_mode", driver.set_mode(mode::POSITION))?;
        setup_step("set_state", driver.set_state(arm_state::READY))?;

        let shared = Arc::new(Shared {
            alive: AtomicBool::new(true),
            last_fault: AtomicI32::new(0),
            last_state: AtomicI32::new(driver.state()),
        });

        let fault_sub = subscribe_fault(&driver, &shared);
        let state_sub = subscribe_state(&driver, &shared);

        tracing::info!("arm session opened");
        Ok(Self {
            driver,
            shared,
            config,
            fault_sub,
            state_sub,
            closed: AtomicBool::new(false),
        })
    }

    /// Whether the session can still accept commands.
    ///
    /// Requires the one-way alive flag, a live connection, and a zero fault
    /// code. If the controller reports the transient pausing state, polls a
    /// bounded number of times for it to settle before judging the state.
    pub fn is_alive(&self) -> bool {
        if !self.shared.alive.load(Ordering::SeqCst)
            || !self.driver.connected()
            || self.driver.fault_code() != 0
        {
            return false;
        }
        let mut polls = 0;
        while self.driver.state() == arm_state::PAUSING && polls < self.config.settle_polls {
            polls += 1;
            thread::sleep(self.config.settle_interval);
        }
        self.driver.state() < arm_state::STOPPED
    }

    /// Gate a command result code.
    ///
    /// Returns true if the session was alive and the code is zero. Otherwise
    /// marks the session dead, logs the label with a connection/state/fault
    /// snapshot, and returns false; the caller must stop issuing commands.
    pub fn check(&self, code: i32, label: &str) -> bool {
        if self.is_alive() && code == 0 {
            return true;
        }
        self.shared.alive.store(false, Ordering::SeqCst);
        tracing::warn!(
            label,
            code,
            connected = self.driver.connected(),
            state = self.driver.state(),
            fault = self.driver.fault_code(),
            "arm command rejected, ending session"
        );
        false
    }

    /// Issue a non-fatal joint move, routed through [`Session::check`].
    pub fn move_joints(&self, cmd: &JointCommand) -> bool {
        let code = self.driver.set_joint_angles(cmd);
        self.check(code, "set_joint_angles")
    }

    /// Issue a gripper move, routed through [`Session::check`].
    pub fn move_gripper(&self, cmd: &GripperCommand) -> bool {
        let code = self.driver.set_gripper_position(cmd);
        self.check(code, "set_gripper_position")
    }

    /// Most recent fault code delivered by the notification stream.
    pub fn last_fault(&self) -> i32 {
        self.shared.last_fault.load(Ordering::SeqCst)
    }

    /// Most recent state delivered by the notification stream.
    pub fn last_state(&self) -> i32 {
        self.shared.last_state.load(Ordering::SeqCst)
    }

    /// Unsubscribe from notifications and disconnect.
    ///
    /// Idempotent; also runs on drop so the driver is disconnected exactly
    /// once whether playback completed or died mid-sequence.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(id) = self.fault_sub.lock().unwrap().take() {
            self.driver.unsubscribe_fault_changes(id);
        }
        if let Some(id) = self.state_sub.lock().unwrap().take() {
            self.driver.unsubscribe_state_changes(id);
        }
        self.driver.disconnect();
        tracing::info!("arm session closed");
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.close();
    }
}

fn setup_step(label: &str, code: i32) -> Result<()> {
    if code != 0 {
        bail!("arm setup failed: {label} returned code {code}");
    }
    Ok(())
}

/// Register the fault-change callback: any non-zero fault kills the session
/// and drops the subscription so later notifications cannot resurrect it.
fn subscribe_fault(driver: &Arc<dyn ArmDriver>, shared: &Arc<Shared>) -> SubSlot {
    let slot: SubSlot = Arc::new(Mutex::new(None));
    let shared = Arc::clone(shared);
    let weak_driver = Arc::downgrade(driver);
    let cb_slot = Arc::clone(&slot);
    let id = driver.subscribe_fault_changes(Arc::new(move |fault| {
        shared.last_fault.store(fault, Ordering::SeqCst);
        if fault != 0 {
            shared.alive.store(false, Ordering::SeqCst);
            tracing::warn!(fault, "arm fault notification, ending session");
            if let Some(driver) = weak_driver.upgrade() {
                if let Some(id) = cb_slot.lock().unwrap().take() {
                    driver.unsubscribe_fault_changes(id);
                }
            }
        }
    }));
    *slot.lock().unwrap() = Some(id);
    slot
}

/// Register the state-change callback: the terminal stopped state kills the
/// session and drops the subscription.
fn subscribe_state(driver: &Arc<dyn ArmDriver>, shared: &Arc<Shared>) -> SubSlot {
    let slot: SubSlot = Arc::new(Mutex::new(None));
    let shared = Arc::clone(shared);
    let weak_driver = Arc::downgrade(driver);
    let cb_slot = Arc::clone(&slot);
    let id = driver.subscribe_state_changes(Arc::new(move |state| {
        shared.last_state.store(state, Ordering::SeqCst);
        if state == arm_state::STOPPED {
            shared.alive.store(false, Ordering::SeqCst);
            tracing::warn!(state, "arm stopped notification, ending session");
            if let Some(driver) = weak_driver.upgrade() {
                if let Some(id) = cb_slot.lock().unwrap().take() {
                    driver.unsubscribe_state_changes(id);
                }
            }
        }
    }));
    *slot.lock().unwrap() = Some(id);
    slot
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::SimArm;

    fn fast_config() -> SessionConfig {
        SessionConfig {
            settle_polls: 2,
            settle_interval: Duration::from_millis(1),
        }
    }

    fn open_sim() -> (Arc<SimArm>, Session) {
        let arm = Arc::new(SimArm::new());
        let session = Session::open(arm.clone() as Arc<dyn ArmDriver>, fast_config()).unwrap();
        (arm, session)
    }

    #[test]
    fn test_open_configures_arm() {
        let (arm, session) = open_sim();
        assert!(arm.motion_enabled());
        assert_eq!(arm.mode(), mode::POSITION);
        assert_eq!(arm.state(), arm_state::READY);
        assert!(session.is_alive());
    }

    #[test]
    fn test_open_fails_on_setup_code() {
        let arm = Arc::new(SimArm::new());
        arm.fail_setup_calls(2);
        assert!(Session::open(arm as Arc<dyn ArmDriver>, fast_config()).is_err());
    }

    #[test]
    fn test_fault_notification_kills_session_permanently() {
        let (arm, session) = open_sim();
        arm.inject_fault(15);
        assert!(!session.is_alive());
        assert_eq!(session.last_fault(), 15);

        // Clearing the fault later does not resurrect the session.
        arm.inject_fault(0);
        assert!(!session.is_alive());
    }

    #[test]
    fn test_stopped_state_kills_session() {
        let (arm, session) = open_sim();
        arm.inject_state(arm_state::STOPPED);
        assert!(!session.is_alive());
        assert_eq!(session.last_state(), arm_state::STOPPED);
    }

    #[test]
    fn test_nonterminal_state_keeps_session() {
        let (arm, session) = open_sim();
        arm.inject_state(arm_state::READY);
        assert!(session.is_alive());
    }

    #[test]
    fn test_check_nonzero_code_kills_session() {
        let (_arm, session) = open_sim();
        assert!(session.check(0, "set_joint_angles"));
        assert!(!session.check(9, "set_joint_angles"));
        assert!(!session.is_alive());
        // Dead stays dead, even for a clean code.
        assert!(!session.check(0, "set_joint_angles"));
    }

    #[test]
    fn test_disconnected_arm_is_not_alive() {
        let (arm, session) = open_sim();
        arm.drop_connection();
        assert!(!session.is_alive());
    }

    #[test]
    fn test_stuck_pausing_state_is_not_alive() {
        let (arm, session) = open_sim();
        arm.set_reported_state(arm_state::PAUSING);
        assert!(!session.is_alive());
    }

    #[test]
    fn test_close_disconnects_once() {
        let (arm, session) = open_sim();
        session.close();
        session.close();
        assert_eq!(arm.disconnect_count(), 1);
        drop(session);
        assert_eq!(arm.disconnect_count(), 1);
    }

    #[test]
    fn test_drop_disconnects() {
        let (arm, session) = open_sim();
        drop(session);
        assert_eq!(arm.disconnect_count(), 1);
    }

    #[test]
    fn test_fault_callback_unsubscribes_itself() {
        let (arm, session) = open_sim();
        assert_eq!(arm.fault_subscriber_count(), 1);
        arm.inject_fault(3);
        assert_eq!(arm.fault_subscriber_count(), 0);
        // Close must not double-unsubscribe or panic.
        session.close();
    }
}
