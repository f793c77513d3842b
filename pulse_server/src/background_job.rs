mod sentiment;

pub use sentiment::*;
