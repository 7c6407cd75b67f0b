pub mod app_state;
mod dispatch;
pub mod focus;
pub mod hub;
mod poller;
pub mod registry;

pub use app_state::AppState;
pub use focus::{FocusArbiter, FocusListener, FocusRequestResult, FocusService};
pub use hub::AudioHub;
pub use registry::Registry;
