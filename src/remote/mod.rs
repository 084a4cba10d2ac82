/*!
 * Remote Provider Bridge
 * Forwards the provider interface across a message transport
 */

pub mod client;
pub mod protocol;
pub mod server;
pub mod transport;

pub use client::RemoteFileSystemProvider;
pub use server::FileSystemProviderServer;
pub use transport::{DuplexTransport, Link, MessageTransport};
