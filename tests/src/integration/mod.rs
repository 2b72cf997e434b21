//! Integration scenarios.

#[cfg(test)]
mod harness;
#[cfg(test)]
mod lifecycle;
#[cfg(test)]
mod replication;
#[cfg(test)]
mod resilience;
