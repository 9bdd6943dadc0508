//! Client for the experiment metadata service.

pub mod collection;
pub mod record;

pub use collection::{ExperimentCollection, ExperimenterError};
