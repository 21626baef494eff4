/// Trainable building blocks for the note network.
pub mod dropout;
pub mod linear;
pub mod lstm;
