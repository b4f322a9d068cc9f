pub mod history;
pub mod inbound;
pub mod nlu;
pub mod session;

pub use history::ConversationLog;
pub use inbound::{InboundOutcome, InboundService};
pub use nlu::{HttpNluClient, NluClient};
pub use session::SessionService;
