//! Application layer: the arbiter state machines and the orchestrating
//! server loop. Depends on `deskring-core` domain types and on channels
//! only — all socket handling lives in `infrastructure`.

pub mod grab;
pub mod selection;
pub mod server;
