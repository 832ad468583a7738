//! Console composition — the page that hosts the access gate and the
//! onboarding dialog for one session, and its HTTP surface.

pub mod routes;
pub mod session;

pub use routes::{ConsoleRouteState, console_routes};
pub use session::{ConsoleSession, ConsoleStatus};
