pub mod booking;
pub mod cleanup;
pub mod payment;

pub use booking::BookingService;
pub use cleanup::HoldSweeper;
pub use payment::{PaymentGateway, PaymentGatewayClient, PaymentVerdict};
