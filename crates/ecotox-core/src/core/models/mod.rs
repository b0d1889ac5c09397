pub mod field;
pub mod grid;
pub mod habitat;
pub mod ids;
pub mod species;
