/// Assembled networks that implement the sequence model seam.
pub mod note_network;
