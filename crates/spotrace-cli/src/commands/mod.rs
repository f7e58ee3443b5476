pub mod check;
pub mod race;
