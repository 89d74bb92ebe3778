pub mod constants;
pub mod ingest;
pub mod leaderboard;
pub mod placement;
pub mod rating;
pub mod store;
pub mod structures;

pub use rating::{RatedMatch, RatingEngine};
pub use store::EstimateStore;
