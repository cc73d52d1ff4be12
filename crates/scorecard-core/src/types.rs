pub use scorecard_types::*;
