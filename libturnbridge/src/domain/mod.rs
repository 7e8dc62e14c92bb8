pub mod participant;
pub mod turn_match;
