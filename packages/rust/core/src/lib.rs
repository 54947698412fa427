//! Core pipeline stages and orchestration for Mindful News.
//!
//! Stages run strictly in order, each taking explicit configuration:
//! [`filter`] → [`cluster`] → [`synthesis`] → [`assembler`], with the
//! optional [`editorial`] pass after assembly. [`pipeline::run`] drives a
//! whole run from feed sources to the written document.

pub mod assembler;
pub mod cluster;
pub mod editorial;
pub mod filter;
pub mod pipeline;
pub mod prompts;
pub mod synthesis;

#[cfg(test)]
mod testing;

pub use cluster::{Cluster, ClusterOutcome, MemberRef};
pub use editorial::EditorialDecision;
pub use pipeline::{ProgressReporter, RunConfig, RunOutcome, RunReport, SilentProgress, run};
pub use prompts::Prompts;
pub use synthesis::SynthesisParts;
