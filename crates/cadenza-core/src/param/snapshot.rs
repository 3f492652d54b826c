//! Parameter snapshots shared between the control and audio threads.
//!
//! Stepped edits publish a whole new [`ParameterSnapshot`] through an
//! `ArcSwap`; continuous edits travel as commands and drive a
//! [`LinearRamp`] per parameter on the audio side. The control side keeps a
//! shadow copy that includes continuous targets, so a later stepped publish
//! never snaps a gliding parameter back to a stale value.

use std::sync::Arc;

use arc_swap::ArcSwap;

use super::ramp::LinearRamp;
use super::range::ParameterDescriptor;
use crate::error::{Error, Result};
use crate::graph::NodeId;
use crate::reclaim::Reclaimer;

/// Immutable set of values for one node.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterSnapshot {
    generation: u64,
    values: Box<[f32]>,
}

impl ParameterSnapshot {
    #[inline]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    #[inline]
    pub fn values(&self) -> &[f32] {
        &self.values
    }
}

/// Control-thread owner of a node's parameters.
pub struct ParameterHandle {
    node: NodeId,
    layout: Arc<[ParameterDescriptor]>,
    shared: Arc<ArcSwap<ParameterSnapshot>>,
    shadow: Vec<f32>,
    generation: u64,
}

impl ParameterHandle {
    /// Build both halves. `max_frames` sizes the per-sample ramp buffers.
    pub fn new(
        node: NodeId,
        layout: Vec<ParameterDescriptor>,
        max_frames: usize,
    ) -> (Self, NodeParams) {
        let layout: Arc<[ParameterDescriptor]> = layout.into();
        let shadow: Vec<f32> = layout.iter().map(|d| d.range.default).collect();
        let shared = Arc::new(ArcSwap::from_pointee(ParameterSnapshot {
            generation: 0,
            values: shadow.clone().into_boxed_slice(),
        }));
        let params = NodeParams {
            layout: layout.clone(),
            shared: shared.clone(),
            generation: 0,
            ramps: shadow.iter().map(|&v| LinearRamp::new(v)).collect(),
            values: shadow.clone(),
            per_sample: layout
                .iter()
                .map(|d| {
                    if d.sample_accurate {
                        vec![d.range.default; max_frames]
                    } else {
                        Vec::new()
                    }
                })
                .collect(),
        };
        (
            Self {
                node,
                layout,
                shared,
                shadow,
                generation: 0,
            },
            params,
        )
    }

    pub fn layout(&self) -> &[ParameterDescriptor] {
        &self.layout
    }

    pub fn index_of(&self, param_id: u32) -> Result<usize> {
        self.layout
            .iter()
            .position(|d| d.id == param_id)
            .ok_or(Error::UnknownParameter {
                node: self.node,
                param: param_id,
            })
    }

    /// Latest value requested from the control side.
    pub fn value(&self, param_id: u32) -> Result<f32> {
        Ok(self.shadow[self.index_of(param_id)?])
    }

    pub fn values(&self) -> impl Iterator<Item = (u32, f32)> + '_ {
        self.layout.iter().map(|d| d.id).zip(self.shadow.iter().copied())
    }

    /// Stepped edit: clamp, then publish a fresh snapshot.
    pub fn set_stepped(
        &mut self,
        param_id: u32,
        value: f32,
        reclaimer: &mut Reclaimer,
    ) -> Result<f32> {
        let index = self.index_of(param_id)?;
        let value = self.layout[index].range.clamp(value);
        self.shadow[index] = value;
        self.publish(reclaimer);
        Ok(value)
    }

    /// Record the target of a continuous edit. Returns the parameter index
    /// and clamped value to put in the ramp command.
    pub fn set_continuous(&mut self, param_id: u32, value: f32) -> Result<(usize, f32)> {
        let index = self.index_of(param_id)?;
        let value = self.layout[index].range.clamp(value);
        self.shadow[index] = value;
        Ok((index, value))
    }

    /// Replace several values with one snapshot. Unknown ids are rejected
    /// before anything is published.
    pub fn set_many(&mut self, values: &[(u32, f32)], reclaimer: &mut Reclaimer) -> Result<()> {
        let mut resolved = Vec::with_capacity(values.len());
        for &(id, value) in values {
            let index = self.index_of(id)?;
            resolved.push((index, self.layout[index].range.clamp(value)));
        }
        for (index, value) in resolved {
            self.shadow[index] = value;
        }
        self.publish(reclaimer);
        Ok(())
    }

    fn publish(&mut self, reclaimer: &mut Reclaimer) {
        self.generation += 1;
        let next = Arc::new(ParameterSnapshot {
            generation: self.generation,
            values: self.shadow.clone().into_boxed_slice(),
        });
        let previous = self.shared.swap(next);
        reclaimer.retire(previous);
    }

    /// Snapshot currently visible to the audio thread.
    pub fn published(&self) -> Arc<ParameterSnapshot> {
        self.shared.load_full()
    }
}

/// Audio-thread view of a node's parameters.
pub struct NodeParams {
    layout: Arc<[ParameterDescriptor]>,
    shared: Arc<ArcSwap<ParameterSnapshot>>,
    generation: u64,
    ramps: Vec<LinearRamp>,
    values: Vec<f32>,
    per_sample: Vec<Vec<f32>>,
}

impl NodeParams {
    /// Parameters of a node without a layout.
    pub fn empty() -> Self {
        let layout: Arc<[ParameterDescriptor]> = Vec::new().into();
        Self {
            layout,
            shared: Arc::new(ArcSwap::from_pointee(ParameterSnapshot {
                generation: 0,
                values: Box::new([]),
            })),
            generation: 0,
            ramps: Vec::new(),
            values: Vec::new(),
            per_sample: Vec::new(),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Observe the latest stepped snapshot once, then advance ramps by
    /// `frames`. Each block sees exactly one snapshot.
    pub fn begin_block(&mut self, frames: usize) {
        if self.values.is_empty() {
            return;
        }
        {
            let snapshot = self.shared.load();
            if snapshot.generation != self.generation {
                self.generation = snapshot.generation;
                for (ramp, &value) in self.ramps.iter_mut().zip(snapshot.values.iter()) {
                    if ramp.target() != value {
                        ramp.set_immediate(value);
                    }
                }
            }
        }

        for (i, ramp) in self.ramps.iter_mut().enumerate() {
            let buffer = &mut self.per_sample[i];
            self.values[i] = if buffer.is_empty() {
                ramp.advance(frames as u32)
            } else {
                let frames = frames.min(buffer.len());
                ramp.fill(&mut buffer[..frames]);
                ramp.current()
            };
        }
    }

    /// Continuous edit from a command. Discrete parameters jump.
    pub fn set_target(&mut self, index: usize, value: f32, ramp_samples: u32) {
        let Some(descriptor) = self.layout.get(index) else {
            return;
        };
        let ramp_samples = if descriptor.range.is_discrete() {
            0
        } else {
            ramp_samples
        };
        self.ramps[index].set_target(descriptor.range.clamp(value), ramp_samples);
    }

    pub fn view(&self, frames: usize) -> ParamValues<'_> {
        ParamValues {
            values: &self.values,
            per_sample: &self.per_sample,
            frames,
        }
    }
}

/// Values a node reads during `process`.
#[derive(Clone, Copy)]
pub struct ParamValues<'a> {
    values: &'a [f32],
    per_sample: &'a [Vec<f32>],
    frames: usize,
}

impl<'a> ParamValues<'a> {
    pub const EMPTY: ParamValues<'static> = ParamValues {
        values: &[],
        per_sample: &[],
        frames: 0,
    };

    /// Block-rate value of the parameter at `index` (layout order).
    #[inline]
    pub fn get(&self, index: usize) -> f32 {
        self.values.get(index).copied().unwrap_or(0.0)
    }

    /// Per-sample ramp for sample-accurate parameters.
    #[inline]
    pub fn ramp(&self, index: usize) -> Option<&'a [f32]> {
        self.per_sample
            .get(index)
            .filter(|buf| !buf.is_empty())
            .map(|buf| &buf[..self.frames.min(buf.len())])
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
