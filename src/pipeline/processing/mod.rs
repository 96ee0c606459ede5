// Card processing: decoding, canonicalization, effect derivation, and validation

pub mod canonical;
pub mod effects;
pub mod normalize;
pub mod parser;
pub mod power_cost;
pub mod quality_gate;
