pub mod round;
pub mod round_source;
pub mod scoring;
pub mod session;
pub mod stats;
pub mod word_group;

// Re-export main components
pub use round::*;
pub use round_source::*;
pub use scoring::*;
pub use session::*;
pub use stats::*;
pub use word_group::*;
