//! # Simulation Callback
//!
//! The per-object movement/physics step is supplied by the game. The engine
//! only requires it to be deterministic: identical inputs must yield
//! bit-identical output, since both the snapshot shift and the replay from an
//! error point assume it.

use crate::command::Command;
use crate::registry::{ObjectHandle, PredictableObject, Simulatable};
use crate::snapshot::PredictedState;

/// Everything a simulation step may read
pub struct StepInput<'a> {
    pub handle: ObjectHandle,
    pub object: &'a PredictableObject,
    pub command: &'a Command,
    /// Seconds to advance
    pub delta_time: f32,
    /// False on replays; one-shot effects (sounds, spawns) should be skipped
    pub first_time_predicted: bool,
    /// Primary object's state for this command, already simulated
    pub primary: Option<&'a PredictedState>,
}

impl StepInput<'_> {
    /// The object's state before this step
    pub fn state(&self) -> &PredictedState {
        self.object.state()
    }
}

/// Contacts reported by a simulation step
#[derive(Debug, Default, Clone)]
pub struct TouchList {
    touched: Vec<ObjectHandle>,
}

impl TouchList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record contact with `other`
    pub fn touch(&mut self, other: ObjectHandle) {
        if !self.touched.contains(&other) {
            self.touched.push(other);
        }
    }

    pub fn as_slice(&self) -> &[ObjectHandle] {
        &self.touched
    }

    pub fn is_empty(&self) -> bool {
        self.touched.is_empty()
    }

    pub(crate) fn take(&mut self) -> Vec<ObjectHandle> {
        std::mem::take(&mut self.touched)
    }
}

/// Game-supplied simulation step
pub trait Simulator {
    /// Advance a standard object by one command
    fn simulate(&mut self, step: &StepInput<'_>, touches: &mut TouchList) -> PredictedState;

    /// Advance a vehicle-driven object by one command
    fn simulate_vehicle(&mut self, step: &StepInput<'_>, touches: &mut TouchList) -> PredictedState {
        self.simulate(step, touches)
    }

    /// `object` stopped touching `other` during the last command
    fn end_touch(&mut self, _object: ObjectHandle, _other: ObjectHandle) {}
}

/// Run the path the object declared at registration
pub(crate) fn dispatch<S: Simulator + ?Sized>(
    simulator: &mut S,
    step: &StepInput<'_>,
    touches: &mut TouchList,
) -> PredictedState {
    match step.object.movement() {
        Simulatable::Standard => simulator.simulate(step, touches),
        Simulatable::Vehicle => simulator.simulate_vehicle(step, touches),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::UserInput;
    use crate::network::NetworkId;
    use slotmap::SlotMap;

    struct Recorder {
        standard: u32,
        vehicle: u32,
    }

    impl Simulator for Recorder {
        fn simulate(&mut self, step: &StepInput<'_>, _touches: &mut TouchList) -> PredictedState {
            self.standard += 1;
            *step.state()
        }

        fn simulate_vehicle(&mut self, step: &StepInput<'_>, _touches: &mut TouchList) -> PredictedState {
            self.vehicle += 1;
            *step.state()
        }
    }

    #[test]
    fn test_dispatch_by_movement() {
        let mut keys: SlotMap<ObjectHandle, ()> = SlotMap::with_key();
        let handle = keys.insert(());
        let command = Command::new(1, UserInput::default());
        let car = PredictableObject::secondary(NetworkId(4), PredictedState::default())
            .with_movement(Simulatable::Vehicle);
        let walker = PredictableObject::secondary(NetworkId(5), PredictedState::default());

        let mut recorder = Recorder { standard: 0, vehicle: 0 };
        let mut touches = TouchList::new();
        for object in [&car, &walker] {
            let step = StepInput {
                handle,
                object,
                command: &command,
                delta_time: 0.015,
                first_time_predicted: true,
                primary: None,
            };
            dispatch(&mut recorder, &step, &mut touches);
        }

        assert_eq!(recorder.standard, 1);
        assert_eq!(recorder.vehicle, 1);
    }

    #[test]
    fn test_touch_list_dedups() {
        let mut keys: SlotMap<ObjectHandle, ()> = SlotMap::with_key();
        let a = keys.insert(());
        let mut touches = TouchList::new();
        touches.touch(a);
        touches.touch(a);

        assert_eq!(touches.as_slice(), &[a]);
        assert_eq!(touches.take(), vec![a]);
        assert!(touches.is_empty());
    }
}
