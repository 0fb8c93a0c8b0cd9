#[cfg(feature = "detect-remote")]
pub mod remote;
pub mod replay;
pub mod stub;

#[cfg(feature = "detect-remote")]
pub use remote::RemoteDetector;
pub use replay::ReplayDetector;
pub use stub::StubDetector;
