pub mod analyze;
pub mod capacity;
pub mod group;
pub mod impedance;
pub mod profile;
