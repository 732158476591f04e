use nb_core::{Bridge, BridgeConfig};

/// Opaque context handle owning an independent bridge.
pub struct NbContext {
    pub bridge: Bridge,
}

impl NbContext {
    pub fn new(config: BridgeConfig) -> Self {
        Self {
            bridge: Bridge::new(config),
        }
    }
}
