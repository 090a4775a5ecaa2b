pub mod address;
pub mod mock;
pub mod protocol;
pub mod transport;

pub use address::ResourceAddress;
pub use mock::{MockTransport, Reply};
pub use protocol::Protocol;
pub use transport::{TcpTransport, Transport};
