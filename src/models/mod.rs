pub mod user;
pub mod event;
pub mod calendar_integration;
pub mod session;
pub mod venue;

pub use user::{NewUser, User, UserProfile};
pub use event::{Event, EventChanges, EventStats, EventStatus, ExternalIds};
pub use calendar_integration::{CalendarIntegration, CalendarProvider, IntegrationChanges, NewCalendarIntegration};
pub use session::Session;
pub use venue::{SaveVenueRequest, SavedVenue};
