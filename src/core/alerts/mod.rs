// Alert lifecycle: policy, feedback decision and the engine.
//
// Architecture:
// - model.rs: Per-class policy and the FeedbackCommand bundle
// - feedback.rs: Which modalities fire for an accepted alert
// - engine.rs: State machine plus the single-writer task that owns it

pub mod engine;
pub mod feedback;
pub mod model;
