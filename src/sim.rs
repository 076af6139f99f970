//! Simulated arm - a drop-in [`ArmDriver`] without hardware.
//!
//! Records every command it receives and lets callers script failures:
//! rejected commands, fault and state notifications, dropped connections.
//! Powers the `traj-play` demo binary and the test suite; a real deployment
//! implements [`ArmDriver`] over its vendor SDK instead.
//!
//! Notification callbacks are invoked on the caller's thread, outside the
//! internal state lock, so a callback may unsubscribe itself.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::arm::{
    arm_state, ArmDriver, GripperCommand, JointCommand, NotifyCallback, SubscriptionId,
};

/// One command the simulator accepted, in arrival order.
#[derive(Clone, Debug)]
pub enum SimOp {
    /// A joint-angle command.
    Joints(JointCommand),
    /// A gripper command.
    Gripper(GripperCommand),
}

#[derive(Default)]
struct SimState {
    connected: bool,
    state: i32,
    fault_code: i32,
    mode: i32,
    motion_enabled: bool,
    ops: Vec<SimOp>,
    joint_commands_seen: usize,
    disconnects: usize,
    setup_calls_seen: usize,
    /// 1-based setup call that returns a non-zero code.
    fail_setup_at: Option<usize>,
    /// 0-based joint command index that returns the given code.
    fail_joint_at: Option<(usize, i32)>,
    /// After this many joint commands, report the given state.
    stop_after: Option<(usize, i32)>,
    next_sub_id: SubscriptionId,
    fault_subs: HashMap<SubscriptionId, NotifyCallback>,
    state_subs: HashMap<SubscriptionId, NotifyCallback>,
}

/// In-memory arm simulator.
pub struct SimArm {
    state: Mutex<SimState>,
}

impl SimArm {
    /// A connected, fault-free simulator in the ready state.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(SimState {
                connected: true,
                state: arm_state::READY,
                next_sub_id: 1,
                ..SimState::default()
            }),
        }
    }

    /// Deliver a fault notification to subscribers and update the
    /// reported fault code.
    pub fn inject_fault(&self, fault: i32) {
        let subs: Vec<NotifyCallback> = {
            let mut st = self.state.lock().unwrap();
            st.fault_code = fault;
            st.fault_subs.values().cloned().collect()
        };
        for cb in subs {
            cb(fault);
        }
    }

    /// Deliver a state notification to subscribers and update the
    /// reported state.
    pub fn inject_state(&self, state: i32) {
        let subs: Vec<NotifyCallback> = {
            let mut st = self.state.lock().unwrap();
            st.state = state;
            st.state_subs.values().cloned().collect()
        };
        for cb in subs {
            cb(state);
        }
    }

    /// Change the reported state without notifying subscribers.
    pub fn set_reported_state(&self, state: i32) {
        self.state.lock().unwrap().state = state;
    }

    /// Report the connection as lost.
    pub fn drop_connection(&self) {
        self.state.lock().unwrap().connected = false;
    }

    /// Make the nth setup call (1-based, across clean/enable/mode/state)
    /// return a non-zero code.
    pub fn fail_setup_calls(&self, nth: usize) {
        self.state.lock().unwrap().fail_setup_at = Some(nth);
    }

    /// Make the joint command at `index` (0-based) return `code`.
    pub fn fail_joint_command_at(&self, index: usize, code: i32) {
        self.state.lock().unwrap().fail_joint_at = Some((index, code));
    }

    /// After `count` joint commands, report `state` via a state
    /// notification, as a controller hitting a limit mid-motion would.
    pub fn stop_after_joint_commands(&self, count: usize, state: i32) {
        self.state.lock().unwrap().stop_after = Some((count, state));
    }

    /// Every accepted command, in arrival order.
    pub fn ops(&self) -> Vec<SimOp> {
        self.state.lock().unwrap().ops.clone()
    }

    /// Accepted joint commands, in arrival order.
    pub fn joint_commands(&self) -> Vec<JointCommand> {
        self.state
            .lock()
            .unwrap()
            .ops
            .iter()
            .filter_map(|op| match op {
                SimOp::Joints(cmd) => Some(cmd.clone()),
                SimOp::Gripper(_) => None,
            })
            .collect()
    }

    /// Accepted gripper commands, in arrival order.
    pub fn gripper_commands(&self) -> Vec<GripperCommand> {
        self.state
            .lock()
            .unwrap()
            .ops
            .iter()
            .filter_map(|op| match op {
                SimOp::Gripper(cmd) => Some(*cmd),
                SimOp::Joints(_) => None,
            })
            .collect()
    }

    /// Times `disconnect` was called.
    pub fn disconnect_count(&self) -> usize {
        self.state.lock().unwrap().disconnects
    }

    /// Live fault-change subscriptions.
    pub fn fault_subscriber_count(&self) -> usize {
        self.state.lock().unwrap().fault_subs.len()
    }

    /// Whether motion is currently enabled.
    pub fn motion_enabled(&self) -> bool {
        self.state.lock().unwrap().motion_enabled
    }

    /// Currently selected control mode.
    pub fn mode(&self) -> i32 {
        self.state.lock().unwrap().mode
    }

    fn setup_call(&self, apply: impl FnOnce(&mut SimState)) -> i32 {
        let mut st = self.state.lock().unwrap();
        st.setup_calls_seen += 1;
        if st.fail_setup_at == Some(st.setup_calls_seen) {
            return 1;
        }
        apply(&mut st);
        0
    }
}

impl Default for SimArm {
    fn default() -> Self {
        Self::new()
    }
}

impl ArmDriver for SimArm {
    fn connected(&self) -> bool {
        self.state.lock().unwrap().connected
    }

    fn state(&self) -> i32 {
        self.state.lock().unwrap().state
    }

    fn fault_code(&self) -> i32 {
        self.state.lock().unwrap().fault_code
    }

    fn clean_warn(&self) -> i32 {
        self.setup_call(|_| {})
    }

    fn clean_error(&self) -> i32 {
        self.setup_call(|st| st.fault_code = 0)
    }

    fn motion_enable(&self, enable: bool) -> i32 {
        self.setup_call(|st| st.motion_enabled = enable)
    }

    fn set_mode(&self, mode: i32) -> i32 {
        self.setup_call(|st| st.mode = mode)
    }

    fn set_state(&self, state: i32) -> i32 {
        self.setup_call(|st| st.state = state)
    }

    fn set_joint_angles(&self, cmd: &JointCommand) -> i32 {
        let (code, notify) = {
            let mut st = self.state.lock().unwrap();
            let index = st.joint_commands_seen;
            st.joint_commands_seen += 1;
            st.ops.push(SimOp::Joints(cmd.clone()));

            let code = match st.fail_joint_at {
                Some((at, code)) if index == at => code,
                _ => 0,
            };
            let notify = match st.stop_after {
                Some((count, state)) if st.joint_commands_seen == count => {
                    st.state = state;
                    Some((state, st.state_subs.values().cloned().collect::<Vec<_>>()))
                }
                _ => None,
            };
            (code, notify)
        };
        if let Some((state, subs)) = notify {
            for cb in subs {
                cb(state);
            }
        }
        code
    }

    fn set_gripper_position(&self, cmd: &GripperCommand) -> i32 {
        self.state.lock().unwrap().ops.push(SimOp::Gripper(*cmd));
        0
    }

    fn subscribe_fault_changes(&self, cb: NotifyCallback) -> SubscriptionId {
        let mut st = self.state.lock().unwrap();
        let id = st.next_sub_id;
        st.next_sub_id += 1;
        st.fault_subs.insert(id, cb);
        id
    }

    fn unsubscribe_fault_changes(&self, id: SubscriptionId) {
        self.state.lock().unwrap().fault_subs.remove(&id);
    }

    fn subscribe_state_changes(&self, cb: NotifyCallback) -> SubscriptionId {
        let mut st = self.state.lock().unwrap();
        let id = st.next_sub_id;
        st.next_sub_id += 1;
        st.state_subs.insert(id, cb);
        id
    }

    fn unsubscribe_state_changes(&self, id: SubscriptionId) {
        self.state.lock().unwrap().state_subs.remove(&id);
    }

    fn disconnect(&self) {
        let mut st = self.state.lock().unwrap();
        st.connected = false;
        st.disconnects += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arm::JOINT_COUNT;

    fn joint_cmd(first: f64) -> JointCommand {
        let mut angles = [0.0; JOINT_COUNT];
        angles[0] = first;
        JointCommand {
            angles,
            speed: 100.0,
            acceleration: 300.0,
            wait: false,
            radians: false,
        }
    }

    #[test]
    fn test_records_commands_in_order() {
        let arm = SimArm::new();
        arm.set_joint_angles(&joint_cmd(1.0));
        arm.set_gripper_position(&GripperCommand {
            position: 0.0,
            speed: 5000.0,
            wait: false,
            auto_enable: true,
        });
        arm.set_joint_angles(&joint_cmd(2.0));

        let ops = arm.ops();
        assert_eq!(ops.len(), 3);
        assert!(matches!(&ops[1], SimOp::Gripper(_)));
        assert_eq!(arm.joint_commands().len(), 2);
        assert_eq!(arm.gripper_commands().len(), 1);
    }

    #[test]
    fn test_scripted_joint_failure() {
        let arm = SimArm::new();
        arm.fail_joint_command_at(1, 9);
        assert_eq!(arm.set_joint_angles(&joint_cmd(0.0)), 0);
        assert_eq!(arm.set_joint_angles(&joint_cmd(1.0)), 9);
        assert_eq!(arm.set_joint_angles(&joint_cmd(2.0)), 0);
    }

    #[test]
    fn test_fault_injection_reaches_subscribers() {
        let arm = SimArm::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_cb = Arc::clone(&seen);
        let id = arm.subscribe_fault_changes(Arc::new(move |code| {
            seen_cb.lock().unwrap().push(code);
        }));

        arm.inject_fault(7);
        assert_eq!(arm.fault_code(), 7);
        assert_eq!(*seen.lock().unwrap(), vec![7]);

        arm.unsubscribe_fault_changes(id);
        arm.unsubscribe_fault_changes(id); // idempotent
        arm.inject_fault(8);
        assert_eq!(*seen.lock().unwrap(), vec![7]);
    }

    #[test]
    fn test_callback_may_unsubscribe_itself() {
        let arm = Arc::new(SimArm::new());
        let arm_cb = Arc::clone(&arm);
        let slot: Arc<Mutex<Option<SubscriptionId>>> = Arc::new(Mutex::new(None));
        let slot_cb = Arc::clone(&slot);
        let id = arm.subscribe_fault_changes(Arc::new(move |_| {
            if let Some(id) = slot_cb.lock().unwrap().take() {
                arm_cb.unsubscribe_fault_changes(id);
            }
        }));
        *slot.lock().unwrap() = Some(id);

        arm.inject_fault(3);
        assert_eq!(arm.fault_subscriber_count(), 0);
    }

    #[test]
    fn test_disconnect_counts() {
        let arm = SimArm::new();
        assert!(arm.connected());
        arm.disconnect();
        arm.disconnect();
        assert!(!arm.connected());
        assert_eq!(arm.disconnect_count(), 2);
    }
}
