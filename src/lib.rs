//! metering-e2e — end-to-end verification of a metering deployment.
//!
//! The binary in `main.rs` is a thin shell around [`cli::run`]. The harness
//! itself lives in `metering-e2e-core`; the Kubernetes collaborator in
//! `metering-e2e-kube`. Both are re-exported so integration tests can import
//! everything from one place.
//!
//! # Architecture
//!
//! ```text
//! CLI + env ──► HarnessConfig ──► Registry ──► Harness ──► RunSummary ──► exit code
//!                                                 │
//!                                           KubeFramework
//! ```

pub mod cli;

pub use metering_e2e_core as core;
pub use metering_e2e_kube as kube;
