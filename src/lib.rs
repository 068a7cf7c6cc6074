//! Swift cross-compilation SDK generator library.
//!
//! Produces a relocatable `.artifactbundle` holding a host Swift toolchain,
//! a target Linux sysroot with the Swift runtime, LLD and the JSON
//! descriptors SwiftPM reads.
//!
//! Stages run in a fixed order and hand each other typed values:
//!
//! ```text
//! artifact::resolve -> fetch::ensure_artifacts -> extract::assemble
//!     -> patch::patch -> manifest::emit
//! ```
//!
//! [`pipeline::generate`] runs all of them.

pub mod artifact;
pub mod cache;
pub mod config;
pub mod error;
pub mod extract;
pub mod fetch;
pub mod manifest;
pub mod patch;
pub mod pipeline;
pub mod preflight;
pub mod process;

use std::time::Instant;

/// Wall-clock timer for a named stage.
pub struct Timer {
    name: &'static str,
    start: Instant,
}

impl Timer {
    pub fn start(name: &'static str) -> Self {
        Self {
            name,
            start: Instant::now(),
        }
    }

    /// Print the elapsed time and return it in seconds.
    pub fn finish(self) -> f64 {
        let secs = self.start.elapsed().as_secs_f64();
        if secs >= 60.0 {
            println!("  [{}: {:.1}m]", self.name, secs / 60.0);
        } else {
            println!("  [{}: {:.1}s]", self.name, secs);
        }
        secs
    }
}
