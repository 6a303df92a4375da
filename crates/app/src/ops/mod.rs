pub mod publish;
pub mod version;

pub use publish::Publish;
pub use version::Version;
