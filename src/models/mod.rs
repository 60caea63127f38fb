pub mod attendee;
pub mod event;
pub mod organizer;
pub mod payment;
pub mod ticket_type;

pub use attendee::{Attendee, AttendeeStatus, RegisterAttendeeRequest};
pub use event::{CreateEventRequest, Event, UpdateEventRequest};
pub use organizer::{LoginRequest, Organizer, RegisterOrganizerRequest};
pub use payment::{CaptureOutcome, Payment, PaymentStatus};
pub use ticket_type::{CreateTicketTypeRequest, TicketType};
