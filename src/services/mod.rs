pub mod bridge;
pub mod encoding;
pub mod fetcher;
pub mod materializer;
pub mod registry;
pub mod session;
