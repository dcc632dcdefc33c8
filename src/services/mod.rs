pub mod credentials;
pub mod upstream;

pub use credentials::{CredentialStore, StaticCredentials, UserRecord};
pub use upstream::{DemoUpstream, Upstream};
