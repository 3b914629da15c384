mod activation_code;
mod activation_record;

pub use activation_code::*;
pub use activation_record::*;
