//! Fast unit-style integration tests
//!
//! These tests drive the engine through its public API with deterministic
//! stub models. None of them needs a network or a real model.

#[path = "unit/helpers.rs"]
mod helpers;
#[path = "unit/config_validation.rs"]
mod config_validation;
#[path = "unit/scenario.rs"]
mod scenario;
#[path = "unit/dispatch.rs"]
mod dispatch;
#[path = "unit/lifecycle.rs"]
mod lifecycle;
#[path = "unit/certainty.rs"]
mod certainty;
