//! Provider-facing descriptors (data) and strategies (behavior).
//!
//! `descriptor` holds the validated token endpoint metadata the refresh engine talks to, with
//! a preset for Trakt. `strategy` defines [`ProviderStrategy`], the HTTP-client-agnostic hook
//! that sorts token endpoint failures into "sign in again" versus "retry next pass".

pub mod descriptor;
pub mod strategy;

pub use descriptor::*;
pub use strategy::*;
