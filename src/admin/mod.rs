/// Admin menu permissions
pub mod menu;

pub use menu::{MenuPermissionResolver, MenuUpdate};
