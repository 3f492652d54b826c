//! Parameter plane: ranges, ramps and published snapshots.

mod ramp;
mod range;
mod snapshot;

pub use ramp::LinearRamp;
pub use range::{db_to_linear, linear_to_db, ParameterDescriptor, ParameterRange, ParameterScale};
pub use snapshot::{NodeParams, ParamValues, ParameterHandle, ParameterSnapshot};
