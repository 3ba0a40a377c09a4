/// Routing of match operations between the local state and the remote API.
pub mod sync_coordinator;
