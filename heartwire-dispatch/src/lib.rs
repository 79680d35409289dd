pub mod config;
pub mod dispatcher;
pub mod session;
pub mod sink;
pub mod state;
pub mod transport;

pub use config::{
    Config, ConfigError, OutletConfig, PartialSubscriptionPolicy, ServerConfig, SessionConfig,
    TransportConfig,
};
pub use dispatcher::{DispatchError, DispatchSummary, run_dispatcher};
pub use session::{Session, SessionOutcome, SessionStage, SessionState, SessionStatus};
pub use sink::memory::MemorySink;
pub use sink::outlet::OutletSink;
pub use sink::queue::{QueueCounts, TickQueue};
pub use sink::{DrainReport, Sink, SinkError, run_drain};
pub use state::{DispatchState, StatusReport};
#[cfg(feature = "ble")]
pub use transport::ble::{BleSettings, BleTransport};
pub use transport::mock::{
    MockFailure, MockJournal, MockSettings, MockTransport, MockTransportError, TransportCall,
};
pub use transport::{DeviceInfo, Transport};
