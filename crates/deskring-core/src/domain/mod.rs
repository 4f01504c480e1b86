//! Pure replication domain logic with no I/O dependencies.

pub mod order;
