//! Cross-crate scenarios. Each file drives real agents against a real
//! frontend through [`crate::harness`].

mod backoff;
mod delivery;
mod enrollment;
mod replay;
mod rotation;
