mod behaviour;
mod handle;
mod service;

pub use behaviour::{BeaconNetworkBehaviour, BeaconNetworkBehaviourEvent};
pub use handle::{NetworkCommand, NetworkHandle, SUBSCRIPTION_BUFFER, SharedState};
pub use service::{NetworkEvent, NetworkService, NetworkServiceConfig};
