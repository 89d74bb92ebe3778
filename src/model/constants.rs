// Rating model constants
pub const DEFAULT_MU: f64 = 25.0;
pub const DEFAULT_SIGMA: f64 = DEFAULT_MU / 3.0;
pub const BETA: f64 = DEFAULT_MU / 6.0;
pub const TAU: f64 = 0.5;
pub const DRAW_PROBABILITY: f64 = 0.1;
pub const MIN_SIGMA: f64 = 2.0;
pub const SIGMA_REDUCTION_RATE: f64 = 0.8;
pub const MARGIN_NORMALIZATION: f64 = 10.0;
pub const DISPLAY_MULTIPLIER: f64 = 50.0;
pub const MIN_INFORMATIVE_ROUNDS: u32 = 10;
pub const FLUKY_LOSS_THRESHOLD: f64 = 0.25;
// A result whose reported winner disagrees with the scores is still rated,
// but never above this confidence.
pub const SCORE_MISMATCH_CONFIDENCE_CAP: f64 = 0.4;

// Placement constants
pub const DEFAULT_PLACEMENT_GAMES: u32 = 9;
pub const MAX_REMATCHES: u32 = 1;
pub const STOP_SIGMA: f64 = 3.0;
pub const MAX_RATING_JUMP: f64 = 20.0;
pub const STREAK_CONFIDENCE: f64 = 0.7;
pub const STREAK_LENGTH: u32 = 2;
// Half-width of the seed rating interval when no other agents exist yet
pub const INTERVAL_SEED_HALF_WIDTH: f64 = 25.0;
