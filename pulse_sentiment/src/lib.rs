mod lexicon;
mod score;

pub use lexicon::*;
pub use score::*;
