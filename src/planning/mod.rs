pub mod api;
pub mod session;


pub use api::{Mode, PlanRequest, PlanResponse, PlanningClient};
pub use session::{PlanningSessionController, SendOutcome, SessionView};
