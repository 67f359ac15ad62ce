pub mod inspect;
pub mod restore;

pub use inspect::InspectCommand;
pub use restore::RestoreCommand;
