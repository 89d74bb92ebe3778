pub mod match_outcome;
pub mod placement_session;
pub mod skill_estimate;
