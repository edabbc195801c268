pub mod endpoints;
pub mod sender;
pub mod service;
pub mod template;

pub use sender::AlertSender;
pub use service::AlertService;
