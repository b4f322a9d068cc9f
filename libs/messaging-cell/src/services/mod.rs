pub mod sender;
pub mod whatsapp;

pub use sender::MessageSender;
pub use whatsapp::WhatsAppClient;
