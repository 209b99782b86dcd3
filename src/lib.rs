pub mod clock;
pub mod config;
pub mod error;
pub mod ids;
pub mod logging;
pub mod proxy;
pub mod server;
pub mod translate;
pub mod writer;

pub use clock::{Clock, FixedClock, SystemClock};
pub use config::ProxyConfig;
pub use error::{ProxyError, Result};
pub use ids::{IdGenerator, RandomIds, SequentialIds};
pub use logging::SharedLogger;
pub use server::{build_router, AppState};
