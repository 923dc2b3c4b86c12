pub mod assessment_handlers;
pub mod auth_handlers;
pub mod chat_handlers;
pub mod interview_handlers;
pub mod personalized_handlers;
pub mod system_handlers;

pub use assessment_handlers::*;
pub use auth_handlers::*;
pub use chat_handlers::*;
pub use interview_handlers::*;
pub use personalized_handlers::*;
pub use system_handlers::*;
