pub mod client;
pub mod supervisor;
pub mod transcode;
