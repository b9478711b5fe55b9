pub mod policy;
pub mod response;

pub use policy::{decide, AccessDecision, AuthRequirement, GateMode, GateOptions};
pub use response::GuardResponse;
