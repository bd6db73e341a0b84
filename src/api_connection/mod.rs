pub mod connection;
pub mod endpoints;
pub mod fake;
pub mod resolver;
pub mod transport;

pub use connection::{ApiConnectionError, ChatProvider};
pub use resolver::{CandidateFailure, EndpointResolver, Resolution};
pub use transport::{HttpReply, HttpTransport, JsonPost, JsonTransport};
