// Content enhancement pipeline.
// Context builders shape the request, the controller submits through the
// backend client and the poller tracks the job until it settles.

pub mod context_builders;
pub mod controller;
pub mod error;
pub mod handlers;
pub mod job;
pub mod poller;
pub mod registry;

#[cfg(test)]
pub(crate) mod testing;
