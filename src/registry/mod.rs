//! # Predictable Object Registry
//!
//! Arena of every object the client may simulate ahead of the server.
//! Objects are addressed by generation-checked [`ObjectHandle`]s so a handle
//! to a released object is detected rather than dereferenced.
//!
//! Iteration order is load-bearing: the Primary object is always visited
//! first, then Secondary objects, then speculative objects, each class in
//! registration order.

pub mod collector;
pub mod interpolation;

use std::collections::HashMap;

use glam::Vec3;
use serde::{Deserialize, Serialize};
use slotmap::{new_key_type, SlotMap};

use crate::error::{PredictionError, Result};
use crate::network::reconcile::SmoothingError;
use crate::network::NetworkId;
use crate::snapshot::{FieldMask, PredictedState};

pub use collector::{ReleaseReason, ReleasedObject, StaleEntityCollector};
pub use interpolation::InterpolationHistory;

new_key_type! {
    /// Generation-checked handle into the [`Registry`]
    pub struct ObjectHandle;
}

/// Capability class of a predictable object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ObjectClass {
    /// The local avatar, simulated before everything else
    Primary,
    /// Other locally predicted objects with a server counterpart
    Secondary,
    /// Client-created objects awaiting server confirmation
    Speculative,
}

/// Which simulation path an object takes, resolved once at registration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Simulatable {
    #[default]
    Standard,
    Vehicle,
}

/// Default interpolation samples kept per object
const DEFAULT_INTERPOLATION_SAMPLES: usize = 16;

/// A registered predictable object
#[derive(Debug, Clone)]
pub struct PredictableObject {
    name: String,
    class: ObjectClass,
    movement: Simulatable,
    fields: FieldMask,
    network_id: Option<NetworkId>,
    locally_owned: bool,
    creation_command: Option<u32>,
    acknowledged: bool,
    dormant_since: Option<u64>,
    linked: Option<NetworkId>,
    stand_in: Option<ObjectHandle>,

    /// Working state advanced by the simulation callback
    pub(crate) current: PredictedState,
    /// Latest authoritative state from the network
    pub(crate) network: PredictedState,
    /// Server time of `network`
    pub(crate) confirmed_time: f64,
    pub(crate) interpolation: InterpolationHistory,
    /// Objects touched during the last simulated command
    pub(crate) touching: Vec<ObjectHandle>,
    pub(crate) smoothing: Option<SmoothingError>,
}

impl PredictableObject {
    fn new(class: ObjectClass, state: PredictedState) -> Self {
        let mut interpolation = InterpolationHistory::new(DEFAULT_INTERPOLATION_SAMPLES);
        interpolation.push(0.0, state.origin);

        Self {
            name: String::new(),
            class,
            movement: Simulatable::Standard,
            fields: FieldMask::all(),
            network_id: None,
            locally_owned: true,
            creation_command: None,
            acknowledged: class != ObjectClass::Speculative,
            dormant_since: None,
            linked: None,
            stand_in: None,
            current: state,
            network: state,
            confirmed_time: 0.0,
            interpolation,
            touching: Vec::new(),
            smoothing: None,
        }
    }

    /// The local avatar
    pub fn primary(network_id: NetworkId, state: PredictedState) -> Self {
        let mut object = Self::new(ObjectClass::Primary, state);
        object.network_id = Some(network_id);
        object
    }

    /// A locally predicted object with a server counterpart
    pub fn secondary(network_id: NetworkId, state: PredictedState) -> Self {
        let mut object = Self::new(ObjectClass::Secondary, state);
        object.network_id = Some(network_id);
        object
    }

    /// A client-created object spawned while predicting `creation_command`
    pub fn speculative(creation_command: u32, state: PredictedState) -> Self {
        let mut object = Self::new(ObjectClass::Speculative, state);
        object.creation_command = Some(creation_command);
        object
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_fields(mut self, fields: FieldMask) -> Self {
        self.fields = fields;
        self
    }

    pub fn with_movement(mut self, movement: Simulatable) -> Self {
        self.movement = movement;
        self
    }

    pub fn with_interpolation_samples(mut self, samples: usize) -> Self {
        let mut interpolation = InterpolationHistory::new(samples);
        interpolation.push(self.confirmed_time, self.network.origin);
        self.interpolation = interpolation;
        self
    }

    pub fn owned_by_session(mut self, owned: bool) -> Self {
        self.locally_owned = owned;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn class(&self) -> ObjectClass {
        self.class
    }

    pub fn movement(&self) -> Simulatable {
        self.movement
    }

    /// Declared predictable fields
    pub fn fields(&self) -> FieldMask {
        self.fields
    }

    pub fn network_id(&self) -> Option<NetworkId> {
        self.network_id
    }

    pub fn is_locally_owned(&self) -> bool {
        self.locally_owned
    }

    pub fn creation_command(&self) -> Option<u32> {
        self.creation_command
    }

    /// Whether the server has confirmed this object
    pub fn is_acknowledged(&self) -> bool {
        self.acknowledged
    }

    pub fn is_dormant(&self) -> bool {
        self.dormant_since.is_some()
    }

    /// First pass that saw the object dormant
    pub fn dormant_since(&self) -> Option<u64> {
        self.dormant_since
    }

    /// Authoritative twin of a confirmed speculative object
    pub fn linked(&self) -> Option<NetworkId> {
        self.linked
    }

    /// Speculative stand-in for this authoritative object, if any
    pub fn stand_in(&self) -> Option<ObjectHandle> {
        self.stand_in
    }

    /// Rolled back and snapshotted by the replay loop
    pub fn is_rewindable(&self) -> bool {
        self.class != ObjectClass::Speculative
    }

    pub fn state(&self) -> &PredictedState {
        &self.current
    }

    pub fn network_state(&self) -> &PredictedState {
        &self.network
    }

    pub fn confirmed_time(&self) -> f64 {
        self.confirmed_time
    }

    pub fn interpolation(&self) -> &InterpolationHistory {
        &self.interpolation
    }

    /// Objects reported as touching after the last simulated command
    pub fn touching(&self) -> &[ObjectHandle] {
        &self.touching
    }

    /// Pending soft-error smoothing hint
    pub fn smoothing(&self) -> Option<&SmoothingError> {
        self.smoothing.as_ref()
    }

    /// Apply an authoritative update received from the network
    pub(crate) fn apply_network(&mut self, state: PredictedState, server_time: f64) {
        self.network = state;
        self.confirmed_time = server_time;
        self.interpolation.push(server_time, state.origin);
    }

    /// Adopt the authoritative state wholesale
    pub(crate) fn restore_network(&mut self) {
        self.current = self.network;
    }

    /// Replace the declared fields of the working state with a stored snapshot
    pub(crate) fn restore_snapshot(&mut self, snapshot: &PredictedState) {
        self.current.copy_fields_from(snapshot, self.fields);
    }
}

/// Owner of every predictable object in a session
pub struct Registry {
    objects: SlotMap<ObjectHandle, PredictableObject>,
    primary: Option<ObjectHandle>,
    secondary: Vec<ObjectHandle>,
    speculative: Vec<ObjectHandle>,
    by_network_id: HashMap<NetworkId, ObjectHandle>,
    pass: u64,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            objects: SlotMap::with_key(),
            primary: None,
            secondary: Vec::new(),
            speculative: Vec::new(),
            by_network_id: HashMap::new(),
            pass: 0,
        }
    }

    /// Register an object. Only one Primary may exist at a time.
    pub fn register(&mut self, object: PredictableObject) -> Result<ObjectHandle> {
        if object.class == ObjectClass::Primary && self.primary.is_some() {
            return Err(PredictionError::PrimaryAlreadyRegistered);
        }

        let class = object.class;
        let name = object.name.clone();
        let network_id = object.network_id;
        let handle = self.objects.insert(object);
        if let Some(id) = network_id {
            self.by_network_id.insert(id, handle);
        }
        match class {
            ObjectClass::Primary => self.primary = Some(handle),
            ObjectClass::Secondary => self.secondary.push(handle),
            ObjectClass::Speculative => self.speculative.push(handle),
        }

        log::debug!("Registered {:?} object {:?} '{}'", class, handle, name);
        Ok(handle)
    }

    /// Remove an object. Unknown handles are ignored.
    pub fn unregister(&mut self, handle: ObjectHandle) -> Option<PredictableObject> {
        let object = self.objects.remove(handle)?;
        match object.class {
            ObjectClass::Primary => self.primary = None,
            ObjectClass::Secondary => self.secondary.retain(|&h| h != handle),
            ObjectClass::Speculative => self.speculative.retain(|&h| h != handle),
        }
        if let Some(id) = object.network_id {
            if self.by_network_id.get(&id) == Some(&handle) {
                self.by_network_id.remove(&id);
            }
        }

        // Stale touch references would otherwise produce end-touch events for a dead object
        for other in self.objects.values_mut() {
            other.touching.retain(|&h| h != handle);
            if other.stand_in == Some(handle) {
                other.stand_in = None;
            }
        }

        Some(object)
    }

    pub fn get(&self, handle: ObjectHandle) -> Option<&PredictableObject> {
        self.objects.get(handle)
    }

    pub fn get_mut(&mut self, handle: ObjectHandle) -> Option<&mut PredictableObject> {
        self.objects.get_mut(handle)
    }

    pub fn contains(&self, handle: ObjectHandle) -> bool {
        self.objects.contains_key(handle)
    }

    pub fn primary(&self) -> Option<ObjectHandle> {
        self.primary
    }

    pub fn primary_object(&self) -> Option<&PredictableObject> {
        self.primary.and_then(|h| self.objects.get(h))
    }

    /// Handles in simulation order: Primary, Secondary, Speculative
    pub fn ordered(&self) -> Vec<ObjectHandle> {
        self.primary
            .iter()
            .chain(self.secondary.iter())
            .chain(self.speculative.iter())
            .copied()
            .collect()
    }

    /// Visit every object in simulation order
    pub fn for_each_in_order<F>(&mut self, mut f: F)
    where
        F: FnMut(ObjectHandle, &mut PredictableObject),
    {
        for handle in self.ordered() {
            if let Some(object) = self.objects.get_mut(handle) {
                f(handle, object);
            }
        }
    }

    /// Speculative objects in registration order
    pub fn speculative(&self) -> &[ObjectHandle] {
        &self.speculative
    }

    /// Take an object out of local simulation without releasing it.
    ///
    /// Dormancy is dated to the next pass, the first one that observes it.
    pub fn mark_dormant(&mut self, handle: ObjectHandle) -> Result<()> {
        let pass = self.pass + 1;
        let object = self.objects.get_mut(handle).ok_or(PredictionError::InvalidHandle)?;
        if object.dormant_since.is_none() {
            object.dormant_since = Some(pass);
            log::debug!("Object {:?} dormant since pass {}", handle, pass);
        }
        Ok(())
    }

    /// Return a dormant object to local simulation
    pub fn wake(&mut self, handle: ObjectHandle) -> Result<()> {
        let object = self.objects.get_mut(handle).ok_or(PredictionError::InvalidHandle)?;
        object.dormant_since = None;
        Ok(())
    }

    /// Server confirmed a speculative object and linked its authoritative twin
    pub fn link(&mut self, handle: ObjectHandle, twin: NetworkId) -> Result<()> {
        let object = self.objects.get_mut(handle).ok_or(PredictionError::InvalidHandle)?;
        object.acknowledged = true;
        object.linked = Some(twin);

        if let Some(twin_handle) = self.find_by_network_id(twin) {
            if let Some(twin_object) = self.objects.get_mut(twin_handle) {
                twin_object.stand_in = Some(handle);
            }
        }
        Ok(())
    }

    pub fn find_by_network_id(&self, id: NetworkId) -> Option<ObjectHandle> {
        self.by_network_id.get(&id).copied()
    }

    /// Current pass index, used to date dormancy
    pub fn pass(&self) -> u64 {
        self.pass
    }

    pub(crate) fn begin_pass(&mut self) -> u64 {
        self.pass += 1;
        self.pass
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Primary object's eye position
    pub fn view_origin(&self) -> Option<Vec3> {
        self.primary_object().map(|p| p.current.eye_position())
    }

    pub fn clear(&mut self) {
        self.objects.clear();
        self.primary = None;
        self.secondary.clear();
        self.speculative.clear();
        self.by_network_id.clear();
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}
