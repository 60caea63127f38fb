pub mod auth;
pub mod checkin;
pub mod email;
pub mod payment_service;
pub mod qr_token;
pub mod razorpay;

pub use auth::AuthService;
pub use checkin::CheckInService;
pub use email::EmailService;
pub use payment_service::PaymentService;
pub use razorpay::RazorpayClient;
