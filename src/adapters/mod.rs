//! Adapters: concrete implementations of the hexagonal port traits.
//!
//! | Adapter        | Implements            | Connects to                 |
//! |----------------|-----------------------|-----------------------------|
//! | `log_sink`     | EventSink             | `log` facade                |
//! | `loopback`     | RadioStackGateway     | in-process simulated stack  |
//! |                | ProfileHost           |                             |
//! |                | SystemSettings        |                             |
//! |                | PowerPort             |                             |
//! |                | PersistencePort       |                             |
//! |                | Subsystem             |                             |

pub mod log_sink;
pub mod loopback;
