pub mod archive;
pub mod layout;

pub use archive::ArchiveBuilder;
pub use layout::StorageLayout;
