pub mod request;
pub mod response;
pub mod stream;

pub use stream::OllamaToChatStream;
