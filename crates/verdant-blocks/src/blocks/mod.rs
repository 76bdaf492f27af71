//! One behavior per supported block type.

mod calculate;
mod container;
mod information;
mod pagination;
mod request;
mod roles;
mod source;
mod step;

pub use calculate::CalculateContainerBlock;
pub use container::InterfaceContainerBlock;
pub use information::InformationBlock;
pub use pagination::PaginationAddon;
pub use request::RequestVcDocumentBlock;
pub use roles::PolicyRolesBlock;
pub use source::DocumentsSourceAddon;
pub use step::InterfaceStepBlock;
