//! Desktop control daemon.
//!
//! Owns the real keyboard, mouse and screen. Clients send signed `ACTION`
//! frames over a local socket and receive `RESULT` frames; push subscribers
//! receive the human input observed on the same desktop.

pub mod capability;
pub mod capture;
pub mod charmap;
pub mod config;
pub mod keymap;
pub mod screenshot;
pub mod server;
pub mod synth;

pub use capability::{CapabilityError, DesktopCapability, FileCapability, FileContents};
pub use capture::CaptureHub;
pub use server::Daemon;
pub use synth::{SynthesisError, Synthesizer};
